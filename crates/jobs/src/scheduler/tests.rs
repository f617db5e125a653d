#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::pool::WorkerPool;
    use crate::scheduler::Scheduler;
    use crate::task::{Job, Task};

    /// Pool that queues work instead of running it, so tests can step
    /// through dispatch one job at a time.
    struct RecordingPool {
        queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
        spawned: AtomicUsize,
    }

    impl RecordingPool {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                queue: Mutex::new(VecDeque::new()),
                spawned: AtomicUsize::new(0),
            })
        }

        /// Run the oldest queued job, if any. The queue lock is released
        /// before the job runs, since jobs enqueue their dependers.
        fn run_next(&self) -> bool {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(work) => {
                    work();
                    true
                }
                None => false,
            }
        }

        fn run_all(&self) {
            while self.run_next() {}
        }

        fn queued(&self) -> usize {
            self.queue.lock().unwrap().len()
        }

        fn spawned(&self) -> usize {
            self.spawned.load(Ordering::Relaxed)
        }
    }

    impl WorkerPool for RecordingPool {
        fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>) {
            self.spawned.fetch_add(1, Ordering::Relaxed);
            self.queue.lock().unwrap().push_back(work);
        }

        fn max_workers(&self) -> usize {
            1
        }
    }

    /// Mock job that counts runs and logs its name into a shared order.
    struct MockJob {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MockJob {
        fn new(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                runs: Arc::new(AtomicUsize::new(0)),
                order: Arc::clone(order),
            }
        }
    }

    impl Job for MockJob {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) {
            self.runs.fetch_add(1, Ordering::Relaxed);
            self.order.lock().unwrap().push(self.name);
        }
    }

    fn run_order() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn scheduler_over(pool: &Arc<RecordingPool>) -> Scheduler {
        let pool: Arc<dyn WorkerPool> = Arc::<RecordingPool>::clone(pool);
        Scheduler::builder().pool(pool).build().unwrap()
    }

    #[test]
    fn empty_batch_on_idle_scheduler_is_already_finished() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);

        let completion = scheduler.submit_batch(Vec::new());

        assert!(completion.is_finished());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(pool.spawned(), 0);
    }

    #[test]
    fn empty_batch_while_draining_shares_the_pending_handle() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let draining = scheduler.submit_batch(vec![Task::independent(MockJob::new("a", &order))]);
        let empty = scheduler.submit_batch(Vec::new());

        assert!(!empty.is_finished());
        pool.run_all();
        assert!(draining.is_finished());
        assert!(empty.is_finished());
    }

    #[test]
    fn independent_batch_signals_after_last_completion() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let tasks: Vec<_> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|name| Task::independent(MockJob::new(name, &order)))
            .collect();
        let completion = scheduler.submit_batch(tasks);

        assert_eq!(scheduler.in_flight_count(), 5);
        for _ in 0..4 {
            assert!(pool.run_next());
        }
        assert!(!completion.is_finished());

        assert!(pool.run_next());
        assert!(completion.is_finished());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(order.lock().unwrap().len(), 5);
    }

    #[test]
    fn chain_runs_in_dependency_order() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let a = Task::graph(MockJob::new("a", &order));
        let b = Task::graph(MockJob::new("b", &order));
        let c = Task::graph(MockJob::new("c", &order));
        b.depends_on(&a);
        c.depends_on(&b);

        let completion = scheduler.submit_batch(vec![
            Arc::clone(&c),
            Arc::clone(&b),
            Arc::clone(&a),
        ]);

        // Only the root is ready at submission.
        assert_eq!(pool.queued(), 1);
        assert_eq!(scheduler.in_flight_count(), 3);

        assert!(pool.run_next());
        assert_eq!(scheduler.in_flight_count(), 2);

        pool.run_all();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(pool.spawned(), 3);
        assert!(completion.is_finished());
    }

    #[test]
    fn fanout_unlocks_all_dependers_once() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let parent = Task::graph(MockJob::new("parent", &order));
        let children: Vec<_> = ["x", "y", "z"]
            .into_iter()
            .map(|name| {
                let child = Task::graph(MockJob::new(name, &order));
                child.depends_on(&parent);
                child
            })
            .collect();

        let mut batch = vec![Arc::clone(&parent)];
        batch.extend(children.iter().map(Arc::clone));
        let completion = scheduler.submit_batch(batch);

        assert_eq!(pool.queued(), 1);
        pool.run_all();

        assert!(completion.is_finished());
        assert_eq!(pool.spawned(), 4);
        let ran = order.lock().unwrap();
        assert_eq!(ran[0], "parent");
        assert_eq!(ran.len(), 4);
    }

    #[test]
    fn diamond_waits_for_both_parents() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let a = Task::graph(MockJob::new("a", &order));
        let b = Task::graph(MockJob::new("b", &order));
        let c = Task::graph(MockJob::new("c", &order));
        let d = Task::graph(MockJob::new("d", &order));
        b.depends_on(&a);
        c.depends_on(&a);
        d.depends_on(&b);
        d.depends_on(&c);

        let completion = scheduler.submit_batch(vec![
            Arc::clone(&a),
            Arc::clone(&b),
            Arc::clone(&c),
            Arc::clone(&d),
        ]);

        assert!(pool.run_next());
        // One parent done: the join still waits on the other.
        assert!(pool.run_next());
        assert_eq!(d.outstanding_dependencies(), 1);
        assert_eq!(pool.queued(), 1);

        pool.run_all();
        assert!(completion.is_finished());
        let ran = order.lock().unwrap();
        assert_eq!(ran[0], "a");
        assert_eq!(ran[3], "d");
        assert_eq!(pool.spawned(), 4);
    }

    #[test]
    fn in_flight_tracks_every_completion() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let tasks: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| Task::independent(MockJob::new(name, &order)))
            .collect();
        let completion = scheduler.submit_batch(tasks);

        for remaining in (0..4usize).rev() {
            assert!(pool.run_next());
            assert_eq!(scheduler.in_flight_count(), remaining);
        }
        assert!(completion.is_finished());
    }

    #[test]
    fn overlapping_batches_share_one_completion() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let first = scheduler.submit_batch(vec![
            Task::independent(MockJob::new("a", &order)),
            Task::independent(MockJob::new("b", &order)),
        ]);
        assert!(pool.run_next());

        let second = scheduler.submit_batch(vec![Task::independent(MockJob::new("c", &order))]);

        // The first batch's own tasks are done here, but its handle now
        // also covers the overlapping submission.
        assert!(pool.run_next());
        assert!(!first.is_finished());
        assert_eq!(scheduler.in_flight_count(), 1);

        assert!(pool.run_next());
        assert!(first.is_finished());
        assert!(second.is_finished());
    }

    #[test]
    fn dependency_completed_in_earlier_batch_starts_with_its_own() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let parent = Task::graph(MockJob::new("parent", &order));
        let child = Task::graph(MockJob::new("child", &order));
        child.depends_on(&parent);

        let first = scheduler.submit_batch(vec![Arc::clone(&parent)]);
        pool.run_all();

        // The child is not in any batch yet: the parent's completion settles
        // its dependency count but must not start it.
        assert!(first.is_finished());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(pool.spawned(), 1);
        assert_eq!(child.outstanding_dependencies(), 0);

        let second = scheduler.submit_batch(vec![Arc::clone(&child)]);
        assert_eq!(pool.queued(), 1);
        pool.run_all();

        assert!(second.is_finished());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["parent", "child"]);
        assert_eq!(pool.spawned(), 2);
    }

    #[test]
    fn depender_submitted_while_dependency_drains_is_unlocked_by_fanout() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let parent = Task::graph(MockJob::new("parent", &order));
        let child = Task::graph(MockJob::new("child", &order));
        child.depends_on(&parent);

        let first = scheduler.submit_batch(vec![Arc::clone(&parent)]);
        let second = scheduler.submit_batch(vec![Arc::clone(&child)]);

        pool.run_all();
        assert!(first.is_finished());
        assert!(second.is_finished());
        assert_eq!(*order.lock().unwrap(), vec!["parent", "child"]);
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn second_completion_report_is_ignored() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let a = Task::independent(MockJob::new("a", &order));
        let b = Task::independent(MockJob::new("b", &order));
        let completion = scheduler.submit_batch(vec![Arc::clone(&a), Arc::clone(&b)]);

        assert!(pool.run_next());
        assert_eq!(scheduler.in_flight_count(), 1);

        scheduler.inner.task_finished(&a);
        assert_eq!(scheduler.in_flight_count(), 1);
        assert!(!completion.is_finished());

        assert!(pool.run_next());
        assert!(completion.is_finished());
    }

    #[test]
    fn completion_report_for_undispatched_task_is_ignored() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let submitted = Task::independent(MockJob::new("a", &order));
        let stray = Task::independent(MockJob::new("stray", &order));
        let completion = scheduler.submit_batch(vec![submitted]);

        scheduler.inner.task_finished(&stray);
        assert_eq!(scheduler.in_flight_count(), 1);
        assert!(!completion.is_finished());

        pool.run_all();
        assert!(completion.is_finished());
    }

    #[test]
    fn panicking_job_still_counts_as_completed() {
        let pool = RecordingPool::new();
        let scheduler = scheduler_over(&pool);
        let order = run_order();

        let panicker = Task::independent(|| panic!("job failure"));
        let normal = Task::independent(MockJob::new("normal", &order));
        let completion = scheduler.submit_batch(vec![panicker, normal]);

        pool.run_all();
        assert!(completion.is_finished());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["normal"]);
    }
}
