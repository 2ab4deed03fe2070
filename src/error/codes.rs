/// Error code registry for the pipeline
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Input (sequence source) errors
/// - 3000-3999: Storage errors
/// - 4000-4999: Execution errors (workers, external decomposer)
/// - 5000-5999: Artifact errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_VALIDATION_FAILED: u16 = 1008;

    // Input errors (2000-2999)
    pub const INPUT_GENERIC: u16 = 2000;
    pub const INPUT_NOT_FOUND: u16 = 2001;
    pub const INPUT_MISSING_COLUMN: u16 = 2002;
    pub const INPUT_MALFORMED_RECORD: u16 = 2003;

    // Storage errors (3000-3999)
    pub const STORAGE_GENERIC: u16 = 3000;
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_PERMISSION_DENIED: u16 = 3002;
    pub const STORAGE_NOT_FOUND: u16 = 3004;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 3011;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_OUTPUT_ERROR: u16 = 4008;
    pub const EXEC_STDIN_ERROR: u16 = 4009;
    pub const EXEC_WORKER_PANICKED: u16 = 4011;
    pub const EXEC_DECOMPOSER_FAULT: u16 = 4012;

    // Artifact errors (5000-5999)
    pub const ARTIFACT_GENERIC: u16 = 5000;
    pub const ARTIFACT_MALFORMED: u16 = 5001;
    pub const ARTIFACT_FOLDER_NOT_FOUND: u16 = 5002;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid TOML syntax in configuration",
        1005 => "Invalid value in configuration",
        1008 => "Configuration validation failed",

        2000 => "Generic input error",
        2001 => "Sequence source not found",
        2002 => "Sequence column missing from CSV header",
        2003 => "Malformed record in sequence source",

        3000 => "Generic storage error",
        3001 => "I/O operation failed",
        3002 => "Permission denied",
        3004 => "File or directory not found",
        3011 => "Failed to serialize data",

        4000 => "Generic execution error",
        4001 => "Command not found",
        4002 => "Execution timed out",
        4003 => "Subprocess exited with an error",
        4005 => "Subprocess terminated by signal",
        4007 => "Failed to spawn subprocess",
        4008 => "Failed to read subprocess output",
        4009 => "Failed to write subprocess stdin",
        4011 => "Worker task panicked",
        4012 => "External decomposer raised a fault",

        5000 => "Generic artifact error",
        5001 => "Batch artifact could not be parsed",
        5002 => "Artifact folder not found",

        9000 => "Generic error",
        9004 => "Internal error",

        _ => "Unknown error code",
    }
}
