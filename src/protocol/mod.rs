pub mod correlator;
pub mod dispatch;
pub mod frame;
pub mod version;
