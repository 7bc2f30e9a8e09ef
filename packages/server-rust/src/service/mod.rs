//! Protocol-level request handling, independent of the HTTP transport.
//!
//! 1. **Method** (`method`): raw verb plus tunneling headers -> `HttpMethod`
//! 2. **Path** (`path`): request URL -> base URI, resource path, resolution prefix
//! 3. **Route** (`route`): resource path -> `ResourceRoute` against the metadata cache
//! 4. **Negotiation** (`negotiate`): `$format` and `Accept` -> response `ContentType`
//! 5. **Dispatch** (`handler`): processors from `registry`, errors via `error`
//! 6. **Debugging** (`debug`): per-request spans and the debug response

pub mod config;
pub mod debug;
pub mod error;
pub mod handler;
pub mod method;
pub mod negotiate;
pub mod path;
pub mod processor;
pub mod registry;
pub mod request;
pub mod route;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use debug::{DebugFormat, DebugInformation, DebugSupport, JsonDebugSupport, RuntimeDebugger};
pub use error::{DispatchError, LibraryError, ODataError, ServerError};
pub use handler::{HandlerOutcome, ODataHandler};
pub use method::HttpMethod;
pub use negotiate::{ContentType, CustomContentTypeSupport, RepresentationKind};
pub use processor::DefaultProcessor;
pub use registry::{CustomETagSupport, ErrorProcessor, ProcessContext, Processor};
pub use request::{ODataRequest, ODataResponse};
pub use route::{ResourceKind, ResourceRoute};
