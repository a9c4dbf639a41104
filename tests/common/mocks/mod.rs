pub mod remote;

pub use remote::{RecordingRemote, RemoteCall};
