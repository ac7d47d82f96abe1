//! Inbound commands from the Connect server.
//!
//! The codec on the other side of the transport parses each command frame
//! into a [`Command`] and hands it to
//! [`Planner::command`](crate::planner::Planner::command).  Decoding
//! problems never surface as errors here: they arrive pre-classified as
//! [`CommandData::BrokenCommand`], [`CommandData::UnknownCommand`] or
//! [`CommandData::GcodeTooLarge`].

/// Server-assigned command identifier.  Echoed back in response events.
pub type CommandId = u32;

/// Identifier of a print job, as known by the printer.
pub type JobId = u16;

/// Maximum length of a filesystem path carried in commands and events.
pub const MAX_PATH_LEN: usize = 256;

/// Maximum length of an inline gcode payload.  Longer payloads are
/// classified as [`CommandData::GcodeTooLarge`] by the codec.
pub const MAX_GCODE_LEN: usize = 1024;

/// Size of an AES block (key and initialisation vector of encrypted
/// downloads).
pub const BLOCK_SIZE: usize = 16;

/// Fixed-capacity path, shared between commands and events.
pub type SharedPath = heapless::String<MAX_PATH_LEN>;

/// Fixed-capacity gcode payload.
pub type GcodeText = heapless::String<MAX_GCODE_LEN>;

/// One cipher block (key or IV).
pub type Block = [u8; BLOCK_SIZE];

/// Build a [`SharedPath`] from a `&str`.  `None` if it doesn't fit.
pub fn shared_path(path: &str) -> Option<SharedPath> {
    let mut out = SharedPath::new();
    out.push_str(path).ok()?;
    Some(out)
}

/// Build a [`GcodeText`] from a `&str`.  `None` if it doesn't fit.
pub fn gcode_text(gcode: &str) -> Option<GcodeText> {
    let mut out = GcodeText::new();
    out.push_str(gcode).ok()?;
    Some(out)
}

/// A command received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub data: CommandData,
}

impl Command {
    pub fn new(id: CommandId, data: CommandData) -> Self {
        Self { id, data }
    }
}

/// Encryption details of a Connect download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encryption {
    pub key: Block,
    pub iv: Block,
    /// Size of the plain-text file (the encrypted stream is padded).
    pub orig_size: u32,
}

/// Parameters of [`CommandData::StartConnectDownload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConnectDownload {
    /// Where to store the file on the printer.
    pub path: SharedPath,
    /// Team the file belongs to (part of the download URL).
    pub team: u64,
    /// Content hash (part of the download URL).
    pub hash: heapless::String<64>,
    /// Non-default port of the file server.
    pub port: Option<u16>,
    /// `None` for plain-text downloads.
    pub encryption: Option<Encryption>,
}

/// The closed set of command kinds.
///
/// Every handler site matches on this exhaustively, so a new kind can't be
/// added without deciding what the planner does with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandData {
    /// The frame was recognised as a command but couldn't be parsed.
    BrokenCommand { reason: &'static str },
    UnknownCommand,
    GcodeTooLarge,
    /// The same command id is already running in the background.
    ProcessingThisCommand,
    /// Another command is running in the background.
    ProcessingOtherCommand,
    Gcode(GcodeText),
    SendInfo,
    SendJobInfo { job_id: JobId },
    SendFileInfo { path: SharedPath },
    SendTransferInfo,
    PausePrint,
    ResumePrint,
    StopPrint,
    StartPrint { path: SharedPath },
    CancelPrinterReady,
    SetPrinterReady,
    StartConnectDownload(StartConnectDownload),
    DeleteFile { path: SharedPath },
    DeleteFolder { path: SharedPath },
    CreateFolder { path: SharedPath },
    StopTransfer,
}

impl CommandData {
    /// Whether handling this command would occupy the background slot.
    pub fn starts_background(&self) -> bool {
        matches!(self, Self::Gcode(_) | Self::StartPrint { .. })
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrokenCommand { .. } => "BROKEN",
            Self::UnknownCommand => "UNKNOWN",
            Self::GcodeTooLarge => "GCODE_TOO_LARGE",
            Self::ProcessingThisCommand => "PROCESSING_THIS",
            Self::ProcessingOtherCommand => "PROCESSING_OTHER",
            Self::Gcode(_) => "GCODE",
            Self::SendInfo => "SEND_INFO",
            Self::SendJobInfo { .. } => "SEND_JOB_INFO",
            Self::SendFileInfo { .. } => "SEND_FILE_INFO",
            Self::SendTransferInfo => "SEND_TRANSFER_INFO",
            Self::PausePrint => "PAUSE_PRINT",
            Self::ResumePrint => "RESUME_PRINT",
            Self::StopPrint => "STOP_PRINT",
            Self::StartPrint { .. } => "START_PRINT",
            Self::CancelPrinterReady => "CANCEL_PRINTER_READY",
            Self::SetPrinterReady => "SET_PRINTER_READY",
            Self::StartConnectDownload(_) => "START_CONNECT_DOWNLOAD",
            Self::DeleteFile { .. } => "DELETE_FILE",
            Self::DeleteFolder { .. } => "DELETE_FOLDER",
            Self::CreateFolder { .. } => "CREATE_FOLDER",
            Self::StopTransfer => "STOP_TRANSFER",
        }
    }
}
