//! Protocol constants and configuration defaults

/// Default AMI TCP port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Socket read chunk size (16KB). AMI blocks are small; list floods arrive as many blocks.
pub const SOCKET_BUF_SIZE: usize = 16 * 1024;

/// Buffer allocation granularity
pub const BUF_CHUNK: usize = 16 * 1024;

/// Maximum size of a single block (1MB). `Command` output for large `core show` listings
/// stays well below this.
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Maximum total buffered bytes (8MB). Exceeding it means the peer is not speaking AMI.
pub const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Protocol line terminator
pub const LINE_TERMINATOR: &str = "\r\n";
/// Blank line ending a block
pub const BLOCK_TERMINATOR: &str = "\r\n\r\n";

/// Banner prefix sent by Asterisk on connect (`Asterisk Call Manager/7.0.3`)
pub const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Marker ending legacy `Response: Follows` command output
pub const END_COMMAND_MARKER: &str = "--END COMMAND--";

/// `Response` field values
pub const RESPONSE_SUCCESS: &str = "Success";
pub const RESPONSE_ERROR: &str = "Error";
pub const RESPONSE_FOLLOWS: &str = "Follows";
pub const RESPONSE_GOODBYE: &str = "Goodbye";

/// `Message` prefix of the login reply (`Authentication accepted` / `failed`)
pub const AUTH_MESSAGE_PREFIX: &str = "Authentication";

/// `EventList` values marking list start and end
pub const EVENT_LIST_START: &str = "start";
pub const EVENT_LIST_COMPLETE: &str = "Complete";

/// Event-name suffix used by list terminators (`CoreShowChannelsComplete`, `PeerlistComplete`)
pub const LIST_COMPLETE_SUFFIX: &str = "Complete";

/// Connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Banner/login/response timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Deadline for the best-effort `Logoff` sent by `close()`
pub const LOGOFF_TIMEOUT_MS: u64 = 1_000;

/// Reader wake-up interval for liveness checks
pub const LIVENESS_TICK_MS: u64 = 1_000;

/// Maximum number of queued events per event stream before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;
