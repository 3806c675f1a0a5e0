//! Control API consumed by the employer portal

mod server;

pub use server::{
    AcceptedResponse, AppState, ControlServer, EffectiveStateDto, EffectiveStateResponse,
    ErrorResponse, ItemsResponse,
};
