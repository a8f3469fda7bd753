mod client;
mod error;
mod reqwest_client;

pub mod prelude {
    pub use crate::client::{HttpClient, HttpResponse};
    pub use crate::error::TransportError;
    pub use crate::reqwest_client::ReqwestHttpClientInstrumented as ReqwestHttpClient;
}
