mod retire;
mod shutdown;

pub mod prelude {
    pub use crate::retire::{RetireHandle, RetireListener};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
