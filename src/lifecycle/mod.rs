//! Process lifecycle: waiting for the signal that ends the daemon

mod shutdown;

pub use shutdown::ShutdownSignal;
