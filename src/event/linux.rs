use core::{
    ptr,
    sync::atomic::{AtomicI32, Ordering},
    time::Duration,
};
use libc::{
    syscall, timespec, SYS_futex, EAGAIN, EINTR, ETIMEDOUT, FUTEX_PRIVATE_FLAG, FUTEX_WAIT,
    FUTEX_WAKE,
};
use std::{io, time::Instant};

const UNSET: i32 = 0;
const WAITING: i32 = 1;
const SET: i32 = 2;

pub struct Event {
    state: AtomicI32,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            state: AtomicI32::new(UNSET),
        }
    }
}

impl Event {
    pub fn set(&self) {
        // Only the waiting thread needs a FUTEX_WAKE, skip it otherwise.
        if self.state.swap(SET, Ordering::Release) == WAITING {
            let r = unsafe {
                syscall(
                    SYS_futex,
                    &self.state as *const _ as *const i32,
                    FUTEX_WAKE | FUTEX_PRIVATE_FLAG,
                    1,
                )
            };
            debug_assert!(r == 0 || r == 1);
        }
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        // A deadline too far out to represent is the same as waiting forever.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                SET => match self.state.compare_exchange_weak(
                    SET,
                    UNSET,
                    Ordering::Acquire,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(s) => state = s,
                },
                UNSET => match self.state.compare_exchange_weak(
                    UNSET,
                    WAITING,
                    Ordering::Acquire,
                    Ordering::Acquire,
                ) {
                    Ok(_) => state = WAITING,
                    Err(s) => state = s,
                },
                WAITING => {
                    let remaining = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                // Leave the event unset unless a set() raced in first.
                                match self.state.compare_exchange(
                                    WAITING,
                                    UNSET,
                                    Ordering::Relaxed,
                                    Ordering::Acquire,
                                ) {
                                    Ok(_) => return false,
                                    Err(s) => {
                                        state = s;
                                        continue;
                                    }
                                }
                            }
                            Some(deadline - now)
                        }
                        None => None,
                    };

                    Self::futex_wait(&self.state, WAITING, remaining);
                    state = self.state.load(Ordering::Acquire);
                }
                _ => unreachable!("invalid event state {}", state),
            }
        }
    }

    fn futex_wait(state: &AtomicI32, expect: i32, timeout: Option<Duration>) {
        let ts = timeout.map(|timeout| timespec {
            tv_sec: timeout.as_secs().try_into().unwrap_or(libc::time_t::MAX),
            tv_nsec: timeout.subsec_nanos() as _,
        });

        let r = unsafe {
            syscall(
                SYS_futex,
                state as *const _ as *const i32,
                FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
                expect,
                ts.as_ref().map_or(ptr::null(), |ts| ts as *const timespec),
            )
        };

        if r == -1 {
            let errno = io::Error::last_os_error().raw_os_error();
            debug_assert!(
                matches!(errno, Some(EAGAIN) | Some(EINTR) | Some(ETIMEDOUT)),
                "unexpected futex error {:?}",
                errno
            );
        }
    }
}
