use crate::time;
use core::{ptr::null_mut, time::Duration};
use winapi::{
    shared::{
        minwindef::{FALSE, TRUE},
        winerror::WAIT_TIMEOUT,
    },
    um::{
        handleapi::CloseHandle,
        synchapi::{CreateEventW, SetEvent, WaitForSingleObject},
        winbase::{WAIT_FAILED, WAIT_OBJECT_0},
        winnt::HANDLE,
    },
};

pub struct Event {
    handle: HANDLE,
}

impl Default for Event {
    fn default() -> Self {
        // auto-reset, initially unset, unnamed.
        let handle = unsafe { CreateEventW(null_mut(), FALSE, FALSE, null_mut()) };
        assert!(
            !handle.is_null(),
            "OS failed to create an event for a condition variable waiter"
        );
        Self { handle }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        let r = unsafe { CloseHandle(self.handle) };
        debug_assert_eq!(r, TRUE);
    }
}

impl Event {
    pub fn set(&self) {
        let r = unsafe { SetEvent(self.handle) };
        debug_assert_eq!(r, TRUE);
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let r = unsafe { WaitForSingleObject(self.handle, time::as_millis(timeout)) };
        match r {
            WAIT_OBJECT_0 => true,
            WAIT_TIMEOUT => false,
            WAIT_FAILED => unreachable!("WaitForSingleObject failed on a condition variable event"),
            _ => unreachable!("WaitForSingleObject returned {:#x}", r),
        }
    }
}
