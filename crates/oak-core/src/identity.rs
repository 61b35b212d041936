use sha2::{Digest, Sha256};

/// A privacy-preserving, stable identifier for this machine/user, stamped
/// on every row the daemon writes so backups can be merged across machines
/// without ever carrying a hostname or username off the box.
///
/// Priority: `OAK_MACHINE_ID` env var (explicit override), else a hash of
/// `/etc/machine-id` (Linux) or the `HOME` path as a last resort, so the
/// value is still stable across restarts even without a system machine id.
pub fn machine_id() -> String {
    if let Ok(explicit) = std::env::var("OAK_MACHINE_ID") {
        return hash_signature(&explicit);
    }

    if let Ok(contents) = std::fs::read_to_string("/etc/machine-id") {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return hash_signature(trimmed);
        }
    }

    if let Some(home) = std::env::var_os("HOME") {
        return hash_signature(&home.to_string_lossy());
    }

    hash_signature("unknown-machine")
}

fn hash_signature(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_is_deterministic_and_opaque() {
        unsafe {
            std::env::set_var("OAK_MACHINE_ID", "laptop-42");
        }
        let a = machine_id();
        let b = machine_id();
        unsafe {
            std::env::remove_var("OAK_MACHINE_ID");
        }
        assert_eq!(a, b);
        assert_ne!(a, "laptop-42");
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_signatures_hash_differently() {
        unsafe {
            std::env::set_var("OAK_MACHINE_ID", "machine-a");
        }
        let a = machine_id();
        unsafe {
            std::env::set_var("OAK_MACHINE_ID", "machine-b");
        }
        let b = machine_id();
        unsafe {
            std::env::remove_var("OAK_MACHINE_ID");
        }
        assert_ne!(a, b);
    }
}
