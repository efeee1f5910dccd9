// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "StateWatch";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "statewatch";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".statewatch";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "statewatch.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "STATEWATCH_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "STATEWATCH_LOG";

// =============================================================================
// Environment Variables - Metrics Store
// =============================================================================

/// Environment variable for the InfluxDB base URL
pub const ENV_INFLUX_URL: &str = "STATEWATCH_INFLUX_URL";

/// Environment variable for the InfluxDB username
pub const ENV_INFLUX_USERNAME: &str = "STATEWATCH_INFLUX_USERNAME";

/// Environment variable for the InfluxDB password
pub const ENV_INFLUX_PASSWORD: &str = "STATEWATCH_INFLUX_PASSWORD";

/// Environment variable for the target database
pub const ENV_DATABASE: &str = "STATEWATCH_DATABASE";

/// Environment variable for the retention policy
pub const ENV_RETENTION_POLICY: &str = "STATEWATCH_RETENTION_POLICY";

/// Environment variable for the write precision
pub const ENV_PRECISION: &str = "STATEWATCH_PRECISION";

/// Environment variable for the write consistency level
pub const ENV_CONSISTENCY: &str = "STATEWATCH_CONSISTENCY";

// =============================================================================
// Environment Variables - Pipeline
// =============================================================================

/// Environment variable for bounded channel capacity
pub const ENV_CHANNEL_CAPACITY: &str = "STATEWATCH_CHANNEL_CAPACITY";

/// Environment variable for points per batch
pub const ENV_BATCH_SIZE: &str = "STATEWATCH_BATCH_SIZE";

/// Environment variable for the partial batch flush interval
pub const ENV_FLUSH_INTERVAL_MS: &str = "STATEWATCH_FLUSH_INTERVAL_MS";

/// Environment variable for write attempts per batch
pub const ENV_WRITE_MAX_ATTEMPTS: &str = "STATEWATCH_WRITE_MAX_ATTEMPTS";

/// Environment variable for write backoff base delay
pub const ENV_WRITE_BASE_DELAY_MS: &str = "STATEWATCH_WRITE_BASE_DELAY_MS";

/// Environment variable to prefer bus event time over processing time
pub const ENV_USE_EVENT_TIME: &str = "STATEWATCH_USE_EVENT_TIME";

// =============================================================================
// Metrics Store Defaults
// =============================================================================

/// Default InfluxDB base URL
pub const DEFAULT_INFLUX_URL: &str = "http://localhost:8086";

/// Default target database
pub const DEFAULT_DATABASE: &str = "systemd";

/// Default retention policy
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// HTTP timeout for store requests
pub const STORE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum response body bytes kept in a rejected-write error
pub const STORE_ERROR_BODY_LIMIT: usize = 512;

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Measurement name for unit state points
pub const MEASUREMENT_SERVICES: &str = "services";

/// Tag key holding the unit name
pub const TAG_SERVICE: &str = "service";

/// Field key holding the as-delivered state string
pub const FIELD_STATE: &str = "state";

/// Field key holding the state ordinal
pub const FIELD_VALUE: &str = "value";

/// Default capacity of the notification and error channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default points per batch (one write per notification)
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Default flush interval for partially filled batches
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Default maximum write attempts per batch
pub const DEFAULT_WRITE_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for write backoff
pub const DEFAULT_WRITE_BASE_DELAY_MS: u64 = 100;

// =============================================================================
// systemd D-Bus
// =============================================================================

/// Well-known bus name of the systemd manager
pub const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";

/// Object path of the systemd manager
pub const SYSTEMD_MANAGER_PATH: &str = "/org/freedesktop/systemd1";

/// Manager interface name
pub const SYSTEMD_MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Unit interface name (first argument of relevant PropertiesChanged signals)
pub const SYSTEMD_UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

/// Namespace of unit object paths
pub const SYSTEMD_UNIT_PATH_NAMESPACE: &str = "/org/freedesktop/systemd1/unit";

/// Standard properties interface
pub const DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Property carrying the unit lifecycle state
pub const PROP_ACTIVE_STATE: &str = "ActiveState";

/// Property carrying the realtime of the last state change (microseconds)
pub const PROP_STATE_CHANGE_TIMESTAMP: &str = "StateChangeTimestamp";

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks on shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Time the dispatch loop keeps writing after shutdown is observed. Anything
/// still unwritten afterwards is counted as dropped. Must stay below
/// `SHUTDOWN_TIMEOUT_SECS` so the loop always finishes its accounting.
pub const SHUTDOWN_DRAIN_BUDGET_SECS: u64 = 5;
