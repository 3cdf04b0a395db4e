/// Formats a byte slice as a readable hex string: `"0x90, 0x05, 0x00"`.
pub fn format_as_hex(slice: &[u8]) -> String {
    slice
        .iter()
        .map(|byte| format!("0x{:02X}", byte))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Pauses the current task for the given amount of time (in ms).
#[macro_export]
macro_rules! pause {
    ($ms:expr) => {
        tokio::time::sleep(tokio::time::Duration::from_millis($ms as u64)).await
    };
}
