mod api;
mod venture;

pub use api::{CsrfTokenResponse, HealthResponse};
pub use venture::{CreateVentureRequest, UpdateVentureRequest, Venture, VentureStage};
