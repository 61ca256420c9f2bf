// sfos-api: Session-authenticated request engine for the SFOS web admin console

pub mod address;
pub mod auth;
pub mod connector;
pub mod device_info;
pub mod error;
pub mod parser;
pub mod request;
pub mod response;
pub mod script;
pub mod subscription;
pub mod template;
pub mod trace;
pub mod transport;

pub use address::{Address, Scheme};
pub use auth::Credentials;
pub use connector::{Connector, SessionPhase};
pub use device_info::{DeviceInfo, DeviceSummary};
pub use error::{Error, ErrorKind};
pub use parser::IndexParser;
pub use request::{BuiltRequest, HttpMethod};
pub use response::{ResponseData, SfosResponse};
pub use script::{Script, ScriptEngine, ScriptItem, Variables};
pub use subscription::Subscription;
pub use template::{Definition, DefinitionSet, TemplateRegistry};
pub use transport::{HttpTransport, Transport, TransportConfig};
