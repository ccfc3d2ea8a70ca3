#[cfg(test)]
mod error_tests {
    use crabphoto::errors::PhotoError;
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_no_device_found_names_owner() {
        let error = PhotoError::NoDeviceFound {
            owner: "left".to_string(),
        };
        assert!(error.to_string().contains("No matching camera"));
        assert!(error.to_string().contains("left"));
    }

    #[test]
    fn test_open_error_helper() {
        let error = PhotoError::open("usb:001,004", "busy");
        assert_eq!(error.to_string(), "Failed to open camera on usb:001,004: busy");
    }

    #[test]
    fn test_config_error_helper() {
        let error = PhotoError::config("iso", "value rejected");
        assert!(matches!(error, PhotoError::ConfigError { ref key, .. } if key == "iso"));
        assert!(error.to_string().contains("value rejected"));
    }

    #[test]
    fn test_batch_mismatch_display() {
        let error = PhotoError::BatchMismatch {
            expected: 2,
            requested: 3,
        };
        assert_eq!(
            error.to_string(),
            "Requested 3 destination paths but 2 pictures are recorded"
        );
    }

    #[test]
    fn test_error_debug_format() {
        let error = PhotoError::IoError("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("IoError"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_error_implements_error_trait() {
        let error = PhotoError::NotReady;
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_kind_labels_are_distinct() {
        let errors = vec![
            PhotoError::NoDeviceFound {
                owner: String::new(),
            },
            PhotoError::open("p", "r"),
            PhotoError::config("k", "r"),
            PhotoError::IoError(String::new()),
            PhotoError::NotReady,
            PhotoError::BatchMismatch {
                expected: 0,
                requested: 1,
            },
            PhotoError::PoisonedLock,
            PhotoError::InvalidSettings(String::new()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
        assert!(kinds.iter().all(|k| !k.contains(' ')));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file exists");
        let error: PhotoError = io.into();
        assert!(matches!(error, PhotoError::IoError(ref msg) if msg.contains("file exists")));
    }

    #[test]
    fn test_poisoned_lock_conversion() {
        let mutex = Arc::new(Mutex::new(0));
        let poisoner = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let error: PhotoError = mutex.lock().unwrap_err().into();
        assert!(matches!(error, PhotoError::PoisonedLock));
    }
}
