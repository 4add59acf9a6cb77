pub mod api_ports;
pub mod archive;
pub mod logging;

pub use api_ports::{PortLease, PortPool};
pub use archive::{extract_zip, extract_zip_async, sha256_file, verify_sha256, ExtractProgressFn};
pub use logging::init_logging;
