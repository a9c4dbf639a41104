pub mod manual_monitor;

pub use manual_monitor::ManualNetworkMonitor;
