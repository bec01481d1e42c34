use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, info};
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".lock";
const GIVE_UP_AFTER: Duration = Duration::from_secs(300);

/// Exclusive advisory lock on a vendor directory, held until dropped.
pub struct VendorLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("Could not lock vendor directory {path}: {error}")]
pub struct Error {
    path: String,
    error: std::io::Error,
}

impl VendorLock {
    pub fn acquire(vendor_dir: &Path) -> Result<Self, Error> {
        let path = vendor_dir.join(LOCK_FILE_NAME);
        let fail = |error| Error {
            path: path.display().to_string(),
            error,
        };

        std::fs::create_dir_all(vendor_dir).map_err(fail)?;
        let file = File::create(&path).map_err(fail)?;
        let start = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(true) => {
                    debug!("Locked {}", path.display());
                    return Ok(Self { _file: file });
                }
                Ok(false) if start.elapsed() < GIVE_UP_AFTER => {
                    if !announced {
                        info!("Waiting for another goop run on {}", vendor_dir.display());
                        announced = true;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                Ok(false) => {
                    return Err(fail(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        format!("still locked after {}s", GIVE_UP_AFTER.as_secs()),
                    )))
                }
                Err(error) => return Err(fail(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_vendor_directory() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join(".vendor");
        let lock = VendorLock::acquire(&vendor_dir).unwrap();
        assert!(vendor_dir.join(LOCK_FILE_NAME).is_file());
        drop(lock);
        VendorLock::acquire(&vendor_dir).unwrap();
    }

    #[test]
    fn second_run_waits_for_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let vendor_dir = dir.path().join(".vendor");
        let first = VendorLock::acquire(&vendor_dir).unwrap();

        let (sender, receiver) = std::sync::mpsc::channel();
        let waiting = {
            let vendor_dir = vendor_dir.clone();
            std::thread::spawn(move || {
                let lock = VendorLock::acquire(&vendor_dir).unwrap();
                sender.send(()).unwrap();
                lock
            })
        };

        assert!(receiver.recv_timeout(Duration::from_millis(1500)).is_err());
        drop(first);
        receiver.recv_timeout(Duration::from_secs(10)).unwrap();
        drop(waiting.join().unwrap());
    }
}
