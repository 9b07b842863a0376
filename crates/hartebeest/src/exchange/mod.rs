//! Out-of-band bootstrap exchangers: the one-shot socket exchange used to
//! agree the network view, and the long-lived memcached exchange used to
//! hand out MR/QP identities while establishing connections.

pub mod kv;
pub mod socket;

pub use kv::KvExchanger;
pub use socket::run as run_socket_exchange;
