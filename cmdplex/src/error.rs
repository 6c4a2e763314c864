use thiserror::Error;

/// Interpreter error taxonomy.
///
/// Errors are captured in a single sticky latch on the interpreter: the first
/// error wins and later failures are ignored until the latch is cleared,
/// either by the application or by a successful error-handler run. The
/// `Display` text is what the stock text-mode error reporter prints.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Command table is full, or the code/name is already registered.
    #[error("command table full or key already in use")]
    CmdOverflow,
    /// Incoming line or packet exceeds the receive buffer.
    #[error("command too long for receive buffer")]
    RecvOverflow,
    /// A handler tried to read past the last argument or payload byte.
    #[error("read past last argument")]
    RecvUnderflow,
    /// Inter-byte timeout expired while a command was being received.
    #[error("timeout while receiving command")]
    RecvTimeout,
    /// Response would not fit in the send buffer.
    #[error("response too long for send buffer")]
    SendOverflow,
    /// No registered command matched and no fallback handler is installed.
    #[error("unknown command")]
    BadCmd,
    /// An argument failed to parse as the requested type.
    #[error("invalid argument")]
    BadArg,
    /// The command handler reported failure.
    #[error("command handler failed")]
    BadHandler,
    /// Malformed binary frame or checksum mismatch.
    #[error("bad packet")]
    BadPacket,
    /// Text tokenizer syntax error, e.g. an unterminated quote.
    #[error("syntax error in command line")]
    ParseErr,
    /// Operation is invalid for the current mode or disabled in this build.
    #[error("operation not supported")]
    Unsupported,
}
