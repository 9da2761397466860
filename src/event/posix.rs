use core::{
    cell::{Cell, UnsafeCell},
    mem::MaybeUninit,
    time::Duration,
};
use libc::{
    clock_gettime, pthread_cond_destroy, pthread_cond_signal, pthread_cond_t,
    pthread_cond_timedwait, pthread_cond_wait, pthread_mutex_destroy, pthread_mutex_lock,
    pthread_mutex_t, pthread_mutex_unlock, time_t, timespec, CLOCK_REALTIME, EINVAL, ETIMEDOUT,
    PTHREAD_COND_INITIALIZER, PTHREAD_MUTEX_INITIALIZER,
};

// The statically initialized cond measures timeouts against CLOCK_REALTIME.
pub struct Event {
    is_set: Cell<bool>,
    cond: UnsafeCell<pthread_cond_t>,
    mutex: UnsafeCell<pthread_mutex_t>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            is_set: Cell::new(false),
            cond: UnsafeCell::new(PTHREAD_COND_INITIALIZER),
            mutex: UnsafeCell::new(PTHREAD_MUTEX_INITIALIZER),
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // Seems as though the destroy functions can return EAGAIN
        // when called using statically initialized types on DragonflyBSD.
        unsafe {
            let r = pthread_mutex_destroy(self.mutex.get());
            if cfg!(target_os = "dragonfly") {
                debug_assert!(r == 0 || r == libc::EAGAIN);
            } else {
                debug_assert_eq!(r, 0);
            }

            let r = pthread_cond_destroy(self.cond.get());
            if cfg!(target_os = "dragonfly") {
                debug_assert!(r == 0 || r == libc::EAGAIN);
            } else {
                debug_assert_eq!(r, 0);
            }
        }
    }
}

impl Event {
    fn locked<T>(&self, f: impl FnOnce() -> T) -> T {
        unsafe {
            let r = pthread_mutex_lock(self.mutex.get());
            debug_assert_eq!(r, 0);

            let result = f();

            let r = pthread_mutex_unlock(self.mutex.get());
            debug_assert_eq!(r, 0);
            result
        }
    }

    pub fn set(&self) {
        self.locked(|| {
            if !self.is_set.replace(true) {
                let r = unsafe { pthread_cond_signal(self.cond.get()) };
                debug_assert_eq!(r, 0);
            }
        })
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        // A deadline too far out to represent is the same as waiting forever.
        let deadline = timeout.and_then(Self::deadline_after);

        self.locked(|| {
            while !self.is_set.get() {
                match deadline {
                    Some(ts) => {
                        let r = unsafe {
                            pthread_cond_timedwait(self.cond.get(), self.mutex.get(), &ts)
                        };
                        debug_assert!(r == 0 || r == ETIMEDOUT || r == EINVAL);
                        if r != 0 && !self.is_set.get() {
                            return false;
                        }
                    }
                    None => {
                        let r = unsafe { pthread_cond_wait(self.cond.get(), self.mutex.get()) };
                        debug_assert_eq!(r, 0);
                    }
                }
            }

            self.is_set.set(false);
            true
        })
    }

    /// Absolute CLOCK_REALTIME time `timeout` from now, `None` on overflow.
    fn deadline_after(timeout: Duration) -> Option<timespec> {
        let now = unsafe {
            let mut now = MaybeUninit::uninit();
            let r = clock_gettime(CLOCK_REALTIME, now.as_mut_ptr());
            debug_assert_eq!(r, 0);
            now.assume_init()
        };

        let secs: time_t = timeout.as_secs().try_into().ok()?;
        let mut tv_sec = now.tv_sec.checked_add(secs)?;
        let mut tv_nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
        if tv_nsec >= 1_000_000_000 {
            tv_sec = tv_sec.checked_add(1)?;
            tv_nsec -= 1_000_000_000;
        }

        Some(timespec { tv_sec, tv_nsec })
    }
}
