pub mod columns;
pub mod config;
pub mod decoder;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod row;
pub mod template;
pub mod transport;

pub use self::columns::ColumnNameManager;
pub use self::config::{ConnectorConfig, StageConfig};
pub use self::decoder::{DecodedResponse, ResponseDecoder};
pub use self::handler::TypeHandler;
pub use self::http::HttpAsyncConnector;
pub use self::metrics::{Aspect, ConnectorMetrics};
pub use self::row::RowManager;
pub use self::template::RequestTemplate;
pub use self::transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};
