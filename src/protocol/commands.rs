//! Module `commands`
//!
//! Defines the FTP command parsing logic and the data structures used to
//! represent commands and the outcome of executing them.

/// Represents an FTP command parsed from the client input.
///
/// Commands that require arguments store them as `String` variants. A known
/// command missing its required argument parses as `NOARG`.
#[derive(Debug, PartialEq)]
pub enum Command {
    USER(String), // Username for login
    PASS(String), // Password for login
    QUIT,
    PASV,                 // Enter passive mode
    LIST(Option<String>), // Directory listing, defaults to the cwd
    RETR(String),         // Retrieve/download file
    STOR(String),         // Store/upload file
    PWD,
    CWD(String), // Change working directory
    CDUP,
    TYPE(String), // Representation type, A or I
    SYST,
    NOOP,
    FEAT,
    NOARG(String),   // Known command used without its argument
    UNKNOWN(String), // Unknown or unsupported command
}

impl Command {
    /// Whether the command may be issued before login completes. Only the
    /// login commands and QUIT are; everything else gets 530.
    pub fn allowed_before_login(&self) -> bool {
        match self {
            Command::USER(_) | Command::PASS(_) | Command::QUIT => true,
            Command::NOARG(cmd) => cmd == "USER",
            _ => false,
        }
    }

    /// Whether the command moves bytes over a data connection.
    pub fn uses_data_connection(&self) -> bool {
        matches!(self, Command::LIST(_) | Command::RETR(_) | Command::STOR(_))
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: String) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message),
        }
    }

    pub fn failure(reason: impl Into<String>, message: String) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            message: Some(message),
        }
    }

    pub fn close(message: String) -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: Some(message),
        }
    }
}

/// Parses a raw command line received from a client into the `Command` enum.
///
/// The verb is case-insensitive. USER and PASS keep their argument byte for
/// byte after the single separator, so credentials with surrounding spaces
/// still compare exactly, and a bare PASS carries an empty password. Other
/// arguments are trimmed but keep their inner whitespace.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_end_matches(['\r', '\n']).trim_start();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let raw_arg = parts.next().unwrap_or("");
    let arg = raw_arg.trim();

    match cmd.as_str() {
        "USER" if !raw_arg.is_empty() => Command::USER(raw_arg.to_string()),
        "PASS" => Command::PASS(raw_arg.to_string()),
        "QUIT" => Command::QUIT,
        "PASV" => Command::PASV,
        "LIST" => Command::LIST(listing_target(arg)),
        "RETR" if !arg.is_empty() => Command::RETR(arg.to_string()),
        "STOR" if !arg.is_empty() => Command::STOR(arg.to_string()),
        "PWD" | "XPWD" => Command::PWD,
        "CWD" | "XCWD" if !arg.is_empty() => Command::CWD(arg.to_string()),
        "CDUP" | "XCUP" => Command::CDUP,
        "TYPE" if !arg.is_empty() => Command::TYPE(arg.to_ascii_uppercase()),
        "SYST" => Command::SYST,
        "NOOP" => Command::NOOP,
        "FEAT" => Command::FEAT,
        "USER" | "RETR" | "STOR" | "CWD" | "XCWD" | "TYPE" => Command::NOARG(cmd),
        _ => Command::UNKNOWN(cmd),
    }
}

/// Option letters accepted in `ls`-style LIST flags such as `-la`.
const LIST_FLAGS: &str = "aAdFhlLR1";

/// Strips leading `ls`-style flags from a LIST argument. The remaining path
/// is kept verbatim. `--` ends the flags, so `LIST -- -la` lists `-la`.
fn listing_target(arg: &str) -> Option<String> {
    let mut rest = arg;
    loop {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..end];
        if token == "--" {
            rest = rest[end..].trim_start();
            break;
        }
        if !is_list_flag(token) {
            break;
        }
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() { None } else { Some(rest.to_string()) }
}

fn is_list_flag(token: &str) -> bool {
    token
        .strip_prefix('-')
        .is_some_and(|letters| !letters.is_empty() && letters.chars().all(|c| LIST_FLAGS.contains(c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_commands() {
        assert_eq!(parse_command("USER alice\r\n"), Command::USER("alice".into()));
        assert_eq!(parse_command("user alice"), Command::USER("alice".into()));
        assert_eq!(parse_command("USER"), Command::NOARG("USER".into()));
        assert_eq!(parse_command("quit"), Command::QUIT);
    }

    #[test]
    fn test_parse_transfer_commands() {
        assert_eq!(parse_command("PASV"), Command::PASV);
        assert_eq!(parse_command("RETR my file.txt"), Command::RETR("my file.txt".into()));
        assert_eq!(parse_command("STOR up.bin"), Command::STOR("up.bin".into()));
        assert_eq!(parse_command("STOR"), Command::NOARG("STOR".into()));
    }

    #[test]
    fn test_list_ignores_flags() {
        assert_eq!(parse_command("LIST"), Command::LIST(None));
        assert_eq!(parse_command("LIST -la"), Command::LIST(None));
        assert_eq!(parse_command("LIST -l docs"), Command::LIST(Some("docs".into())));
        assert_eq!(parse_command("LIST /a/b"), Command::LIST(Some("/a/b".into())));
        assert_eq!(parse_command("LIST -l my  docs"), Command::LIST(Some("my  docs".into())));
        assert_eq!(parse_command("LIST -notes.txt"), Command::LIST(Some("-notes.txt".into())));
        assert_eq!(parse_command("LIST -- -la"), Command::LIST(Some("-la".into())));
    }

    #[test]
    fn test_credentials_keep_surrounding_spaces() {
        assert_eq!(parse_command("PASS  pw \r\n"), Command::PASS(" pw ".into()));
        assert_eq!(parse_command("PASS s3cret pw"), Command::PASS("s3cret pw".into()));
        assert_eq!(parse_command("PASS"), Command::PASS(String::new()));
        assert_eq!(parse_command("PASS \r\n"), Command::PASS(String::new()));
        assert_eq!(parse_command("USER  alice"), Command::USER(" alice".into()));
    }

    #[test]
    fn test_parse_auxiliary_commands() {
        assert_eq!(parse_command("TYPE i"), Command::TYPE("I".into()));
        assert_eq!(parse_command("XPWD"), Command::PWD);
        assert_eq!(parse_command("CWD .."), Command::CWD("..".into()));
        assert_eq!(parse_command("CDUP"), Command::CDUP);
        assert_eq!(parse_command("SYST"), Command::SYST);
        assert_eq!(parse_command("FEAT"), Command::FEAT);
        assert_eq!(parse_command("PORT 1,2,3,4,5,6"), Command::UNKNOWN("PORT".into()));
        assert_eq!(parse_command(""), Command::UNKNOWN(String::new()));
    }

    #[test]
    fn test_login_gate() {
        assert!(Command::QUIT.allowed_before_login());
        assert!(Command::USER("a".into()).allowed_before_login());
        assert!(!Command::PASV.allowed_before_login());
        assert!(!Command::LIST(None).allowed_before_login());
        assert!(!Command::PWD.allowed_before_login());
        assert!(!Command::SYST.allowed_before_login());
        assert!(!Command::FEAT.allowed_before_login());
        assert!(!Command::NOOP.allowed_before_login());
        assert!(!Command::UNKNOWN("PORT".into()).allowed_before_login());
    }
}
