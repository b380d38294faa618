//! Engine services
//!
//! Business logic over the data-layer ports: intake routing, dispatch
//! fan-out, preference policy, the in-app inbox, adapter routing, and
//! realtime fan-out.

pub mod dispatch;
pub mod inbox;
pub mod intake;
pub mod messenger;
pub mod preferences;
pub mod realtime;
pub mod registry;
pub mod render;

pub use dispatch::{DispatchError, DispatchOptions, Dispatcher, DispatcherPorts};
pub use inbox::{InboxError, InboxService};
pub use intake::{IntakeError, IntakeRequest, IntakeService};
pub use messenger::{Capabilities, Messenger, OutboundMessage, SendError};
pub use preferences::{EvaluateRequest, Evaluation, PreferenceResolver, Reason, ScopeRef};
pub use registry::{AdapterRegistry, RegistryError};
pub use render::{RenderError, RenderRequest, Rendered, TemplateRenderer};
