//! Per-file transfer descriptor (spec.md §3, "Transfer state"). The
//! receive/sender loops (`receiver::ReceiverLoop`, `sender::SenderLoop`) own
//! the live bitmap/retransmit-table/statistics machinery themselves; this is
//! the lightweight record the multi-file driver (§4.11) and the binaries
//! carry alongside each file in a session to report progress, independent
//! of those loops' internals.

/// Identifies one file within a (possibly multi-file) session and its
/// negotiated size in blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub remote_filename: String,
    pub local_filename: String,
    pub file_size: u64,
    pub block_count: u64,
}

impl Transfer {
    pub fn new(remote_filename: String, local_filename: String, file_size: u64, block_count: u64) -> Self {
        Self { remote_filename, local_filename, file_size, block_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_the_negotiated_file_identity() {
        let transfer = Transfer::new("remote.dat".into(), "local.dat".into(), 100_000, 25);
        assert_eq!(transfer.remote_filename, "remote.dat");
        assert_eq!(transfer.local_filename, "local.dat");
        assert_eq!(transfer.file_size, 100_000);
        assert_eq!(transfer.block_count, 25);
    }
}
