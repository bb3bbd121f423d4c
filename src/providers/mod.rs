mod error;
mod responses;

pub use error::{ProviderError, ProviderErrorKind};
pub use responses::{
    ResponseFunctionCall, ResponseInput, ResponseOptions, ResponseOutputItem, ResponsesApi,
    ResponsesClient, ResponsesResponse,
};
