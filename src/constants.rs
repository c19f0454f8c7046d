pub const DNS_PORT: u16 = 53;
pub const MAX_UDP_PACKET_SIZE: usize = 512;
pub const UDP_RECV_BUFFER_SIZE: usize = 4096;
pub const EDNS_UDP_SIZE: u16 = 4096;

// Per-attempt default timeout, kept short so several retries fit inside a
// typical caller deadline.
pub const QUANTUM_SECS: u64 = 20;
pub const DEFAULT_RETRIES: usize = 3;

// TSIG time window advertised on signed queries.
pub const TSIG_FUDGE_SECS: u16 = 300;
