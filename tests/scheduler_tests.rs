#[cfg(all(test, target_os = "linux"))]
mod scheduler_tests {
    use std::ffi::c_void;
    use std::ptr;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use sequential_test::sequential;
    use uthread::scheduler::{
        QueueIndex, ThreadPriority, UThread, UThreadError, UThreadOptions,
    };

    // These scenarios exercise scheduling decisions made at API calls, not
    // timer ticks; the long quantum keeps ticks out of the picture.
    fn options() -> UThreadOptions {
        UThreadOptions {
            stack_size: 64 * 1024,
            time_slice: Duration::from_millis(500),
        }
    }

    extern "C" fn noop_entry(_argument: *mut c_void) {}

    static SOLO_ARGUMENT: AtomicUsize = AtomicUsize::new(0);
    static SOLO_ID: AtomicU64 = AtomicU64::new(0);

    extern "C" fn solo_entry(argument: *mut c_void) {
        SOLO_ARGUMENT.store(argument as usize, Ordering::SeqCst);
        SOLO_ID.store(UThread::current_thread_id().unwrap_or(0), Ordering::SeqCst);
        // returning without an explicit exit call terminates the thread
    }

    #[test]
    #[sequential]
    fn solo_thread_runs_to_completion() {
        UThread::init(options()).unwrap();
        let id = UThread::schedule_thread(solo_entry, 42usize as *mut c_void, ThreadPriority::Medium, 0)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(SOLO_ARGUMENT.load(Ordering::SeqCst), 42);
        assert_eq!(SOLO_ID.load(Ordering::SeqCst), id);
        assert_eq!(UThread::current_queue(), QueueIndex::Undefined);
        for queue in [QueueIndex::Low, QueueIndex::Medium, QueueIndex::High] {
            assert_eq!(UThread::queue_len(queue), 0);
        }
        assert!(UThread::thread_info(id).is_none());
        UThread::check_invariants();
    }

    static EXIT_REACHED: AtomicBool = AtomicBool::new(false);
    static AFTER_EXIT_REACHED: AtomicBool = AtomicBool::new(false);

    extern "C" fn exiting_entry(_argument: *mut c_void) {
        EXIT_REACHED.store(true, Ordering::SeqCst);
        UThread::exit_thread();
        AFTER_EXIT_REACHED.store(true, Ordering::SeqCst);
    }

    #[test]
    #[sequential]
    fn exit_thread_does_not_return_to_the_caller() {
        UThread::init(options()).unwrap();
        let id = UThread::schedule_thread(exiting_entry, ptr::null_mut(), ThreadPriority::Low, 0)
            .unwrap();
        assert!(EXIT_REACHED.load(Ordering::SeqCst));
        assert!(!AFTER_EXIT_REACHED.load(Ordering::SeqCst));
        assert!(UThread::thread_info(id).is_none());
        assert_eq!(UThread::current_queue(), QueueIndex::Undefined);
        UThread::check_invariants();
    }

    #[test]
    fn schedule_before_init_is_rejected() {
        std::thread::spawn(|| {
            assert!(!UThread::is_initialized());
            let result =
                UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::Medium, 0);
            assert_eq!(result, Err(UThreadError::NotInitialized));
            assert_eq!(UThread::current_queue(), QueueIndex::Undefined);
            assert_eq!(UThread::current_thread_id(), None);
        })
        .join()
        .unwrap();
    }

    static PREEMPTOR_DONE: AtomicBool = AtomicBool::new(false);
    static CREATOR_SAW_PREEMPTOR_DONE: AtomicBool = AtomicBool::new(false);

    extern "C" fn preemptor_entry(_argument: *mut c_void) {
        PREEMPTOR_DONE.store(true, Ordering::SeqCst);
    }

    extern "C" fn preempted_creator_entry(_argument: *mut c_void) {
        UThread::schedule_thread(preemptor_entry, ptr::null_mut(), ThreadPriority::High, 0)
            .unwrap();
        // the high-priority thread must have run to completion by now
        CREATOR_SAW_PREEMPTOR_DONE.store(PREEMPTOR_DONE.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    #[test]
    #[sequential]
    fn higher_priority_thread_preempts_its_creator() {
        UThread::init(options()).unwrap();
        UThread::schedule_thread(preempted_creator_entry, ptr::null_mut(), ThreadPriority::Medium, 0)
            .unwrap();
        assert!(CREATOR_SAW_PREEMPTOR_DONE.load(Ordering::SeqCst));
        UThread::check_invariants();
    }

    static CHILD_SAW_PARENT: AtomicU64 = AtomicU64::new(0);
    static PARENT_CHILD_COUNT: AtomicU64 = AtomicU64::new(0);
    static PARENT_HAS_PARENT: AtomicBool = AtomicBool::new(false);

    extern "C" fn child_entry(argument: *mut c_void) {
        let parent_id = argument as usize as u64;
        let own = UThread::current_thread_id().unwrap();
        if let Some(info) = UThread::thread_info(own) {
            CHILD_SAW_PARENT.store(info.parent.unwrap_or(0), Ordering::SeqCst);
        }
        if let Some(info) = UThread::thread_info(parent_id) {
            PARENT_CHILD_COUNT.store(info.number_of_children as u64, Ordering::SeqCst);
        }
    }

    extern "C" fn parenting_entry(_argument: *mut c_void) {
        let own = UThread::current_thread_id().unwrap();
        PARENT_HAS_PARENT.store(
            UThread::thread_info(own).unwrap().parent.is_some(),
            Ordering::SeqCst,
        );
        UThread::schedule_thread(child_entry, own as usize as *mut c_void, ThreadPriority::Medium, 0)
            .unwrap();
    }

    #[test]
    #[sequential]
    fn parent_child_relation_is_recorded() {
        UThread::init(options()).unwrap();
        let parent = UThread::schedule_thread(
            parenting_entry,
            ptr::null_mut(),
            ThreadPriority::Medium,
            0,
        )
        .unwrap();
        assert_eq!(CHILD_SAW_PARENT.load(Ordering::SeqCst), parent);
        assert_eq!(PARENT_CHILD_COUNT.load(Ordering::SeqCst), 1);
        // threads scheduled from the host context have no parent
        assert!(!PARENT_HAS_PARENT.load(Ordering::SeqCst));
        UThread::check_invariants();
    }

    static LOW_RING_LEN: AtomicUsize = AtomicUsize::new(0);
    static LOW_FOUND_ALL: AtomicBool = AtomicBool::new(false);
    static SPAWNER_CHILDREN: AtomicU64 = AtomicU64::new(0);

    extern "C" fn spawning_entry(_argument: *mut c_void) {
        let mut ids = [0u64; 3];
        for slot in ids.iter_mut() {
            *slot = UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::Low, 0)
                .unwrap();
        }
        // lower-priority children must not have run yet
        UThread::check_invariants();
        LOW_RING_LEN.store(UThread::queue_len(QueueIndex::Low), Ordering::SeqCst);
        LOW_FOUND_ALL.store(
            ids.iter().all(|id| UThread::find_thread(QueueIndex::Low, *id)),
            Ordering::SeqCst,
        );
        let own = UThread::current_thread_id().unwrap();
        SPAWNER_CHILDREN.store(
            UThread::thread_info(own).unwrap().number_of_children as u64,
            Ordering::SeqCst,
        );
    }

    #[test]
    #[sequential]
    fn lower_priority_children_stay_queued_until_the_spawner_exits() {
        UThread::init(options()).unwrap();
        UThread::schedule_thread(spawning_entry, ptr::null_mut(), ThreadPriority::Medium, 0)
            .unwrap();
        assert_eq!(LOW_RING_LEN.load(Ordering::SeqCst), 3);
        assert!(LOW_FOUND_ALL.load(Ordering::SeqCst));
        assert_eq!(SPAWNER_CHILDREN.load(Ordering::SeqCst), 3);
        // the low queue drained once the spawner exited
        assert_eq!(UThread::queue_len(QueueIndex::Low), 0);
        assert_eq!(UThread::current_queue(), QueueIndex::Undefined);
        UThread::check_invariants();
    }

    #[test]
    #[sequential]
    fn thread_ids_are_monotonic_and_restart_with_the_instance() {
        UThread::init(options()).unwrap();
        let first = UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::Medium, 0)
            .unwrap();
        let second = UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::High, 0)
            .unwrap();
        let third =
            UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::Low, 32 * 1024)
                .unwrap();
        assert_eq!((first, second, third), (1, 2, 3));

        // a fresh instance starts a fresh id sequence
        UThread::init(options()).unwrap();
        let restarted =
            UThread::schedule_thread(noop_entry, ptr::null_mut(), ThreadPriority::Medium, 0)
                .unwrap();
        assert_eq!(restarted, 1);
        UThread::check_invariants();
    }
}
