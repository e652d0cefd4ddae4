//! Notice engine: portal session, grid fetch, row parsing and sink dispatch.
mod config;
mod decode;
mod dispatch;
mod fetch;
mod markup;
mod parse;
mod persist;
mod pipeline;
mod progress;
mod session;
mod sink;
mod types;

pub use config::{
    load_dotenv, load_env_file, normalize_base_url, ConfigError, RelayConfig, SinkConfig,
    DEFAULT_GRID_QUERY_ID, DEFAULT_GRID_URL, MIN_SETTLE_DELAY, SINK_PATH,
};
pub use decode::{decode_body, DecodedBody};
pub use dispatch::{DispatchReport, Dispatcher, SinkReport};
pub use fetch::{grid_params, FetchSettings, GridFetcher, ReqwestGridFetcher, GRID_PAGE_SIZE};
pub use markup::strip_markup;
pub use parse::{
    notice_from_row, parse_grid, read_rows, unescape_cell_text, GridRow, ParseError, ParsedGrid,
    MIN_CELLS,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError, SnapshotWriter};
pub use pipeline::{Clock, Pipeline, RunOutcome, RunReport};
pub use progress::{NullProgressSink, ProgressSink, RecordingProgressSink};
pub use session::{
    ensure_session, AuthError, CookieFileSessionProvider, PortalSession, SessionProvider,
    SessionTokens, SESSION_COOKIES, SSO_COOKIE,
};
pub use sink::{PushReceipt, PushSink, SinkError, API_KEY_HEADER, JSON_CONTENT_TYPE};
pub use types::{FailureKind, FetchError, FetchMetadata, GridResponse, HttpMethod, RunEvent, Stage};
