use crate::error::{Result, SelfCheckError};

/// Name of the machine we are running on.
#[cfg(unix)]
pub fn current_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok()
}

#[cfg(not(unix))]
pub fn current_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
}

/// Refuse to continue unless `actual` is exactly `required`.
pub fn check(required: &str, actual: Option<&str>) -> Result<()> {
    match actual {
        Some(name) if name == required => Ok(()),
        other => Err(SelfCheckError::WrongHost {
            required: required.to_string(),
            actual: other.unwrap_or("<unknown>").to_string(),
        }),
    }
}
