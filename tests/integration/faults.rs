//! Host-side fault policies: retry, tear down, inspect.

use std::cell::Cell;
use std::rc::Rc;

use weft::{Frame, Pool, Step, StepResult, TaskFault};

#[test]
fn a_host_can_retry_until_the_task_recovers() {
    let attempts = Rc::new(Cell::new(0));
    let a = attempts.clone();
    let mut pool = Pool::new();
    pool.spawn(Frame::new(move || {
        a.set(a.get() + 1);
        if a.get() <= 2 {
            return Err(TaskFault::msg("flaky"));
        }
        Ok(Step::Complete)
    }));

    let mut faults = 0;
    while !pool.is_empty() {
        if pool.tick().is_err() {
            faults += 1;
            assert!(faults <= 2, "fault persisted past its flaky window");
        }
    }

    assert_eq!(faults, 2);
    assert_eq!(attempts.get(), 3);
}

#[test]
fn a_host_can_tear_down_on_the_first_fault() {
    let resumes = Rc::new(Cell::new(0));
    let r = resumes.clone();

    // Parent awaits a sub-task that faults on its second step.
    let mut awaited = false;
    let parent = Frame::new(move || {
        if !awaited {
            awaited = true;
            let r = r.clone();
            return Ok(Step::Await(Frame::new(move || -> StepResult {
                r.set(r.get() + 1);
                if r.get() == 1 {
                    return Ok(Step::Yield);
                }
                Err(TaskFault::msg("sub-task died"))
            })));
        }
        Ok(Step::Complete)
    });

    let mut pool = Pool::new();
    pool.spawn(parent);

    pool.tick().unwrap();
    let err = pool.tick().unwrap_err();
    assert!(err.to_string().contains("sub-task died"));

    pool.clear();
    assert!(pool.is_empty());

    // Nothing ran after the teardown.
    let after = resumes.get();
    pool.tick().unwrap();
    assert_eq!(resumes.get(), after);
}

#[test]
fn faults_carry_the_underlying_host_error() {
    let mut pool = Pool::new();
    pool.spawn(Frame::new(|| -> StepResult {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "state file missing");
        Err(TaskFault::new(err))
    }));

    let fault = pool.tick().unwrap_err();
    let io = fault
        .inner()
        .downcast_ref::<std::io::Error>()
        .expect("fault should wrap the io::Error it was built from");
    assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn fresh_tasks_can_be_registered_after_a_fault() {
    // Retry policy by re-registration: give up on the broken chain,
    // clear, and spawn a replacement.
    let mut pool = Pool::new();
    pool.spawn(Frame::new(|| -> StepResult {
        Err(TaskFault::msg("unrecoverable"))
    }));

    assert!(pool.tick().is_err());
    pool.clear();

    let done = Rc::new(Cell::new(false));
    let d = done.clone();
    pool.spawn(Frame::new(move || {
        d.set(true);
        Ok(Step::Complete)
    }));

    pool.tick().unwrap();
    assert!(done.get());
    assert!(pool.is_empty());
}
