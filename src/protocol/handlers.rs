//! Command handlers module for the FTP server.
//!
//! This module defines a handler for each FTP command. Handlers drive the
//! session state machine (`Connected` → `AwaitingPassword` → `Authenticated`
//! → `Closed`), set up passive data channels and run transfers inside the
//! session's home directory.

use chrono::Local;
use log::{info, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::client::Session;
use crate::error::handlers::{auth_error_reply, path_error_reply, transfer_error_reply};
use crate::error::{PathError, TransferError};
use crate::protocol::responses::*;
use crate::protocol::{Command, CommandResult};
use crate::server::ServerContext;
use crate::storage::operations::{
    change_directory, create_for_storage, format_listing, list_entries, open_for_retrieval,
};
use crate::storage::resolve_in_jail;
use crate::transfer::{PendingDataChannel, receive_file, send_file, send_listing};

/// Dispatches a received FTP command to its corresponding handler.
///
/// Transfer commands write their preliminary `150` reply to `writer`
/// themselves; the returned result carries the final reply. The only error
/// returned is a failure to write to the control connection.
pub async fn handle_command<W>(
    session: &mut Session,
    command: Command,
    ctx: &ServerContext,
    writer: &mut W,
) -> io::Result<CommandResult>
where
    W: AsyncWrite + Unpin,
{
    if !session.is_authenticated() && !command.allowed_before_login() {
        return Ok(CommandResult::failure(
            "Not logged in",
            format_response(NOT_LOGGED_IN, "Please login with USER and PASS."),
        ));
    }

    let result = match command {
        Command::USER(username) => handle_cmd_user(session, &username),
        Command::PASS(password) => handle_cmd_pass(session, &password, ctx).await,
        Command::QUIT => handle_cmd_quit(session).await,
        Command::PASV => handle_cmd_pasv(session, ctx).await,
        Command::LIST(path) => handle_cmd_list(session, path.as_deref(), writer).await?,
        Command::RETR(path) => handle_cmd_retr(session, &path, ctx, writer).await?,
        Command::STOR(path) => handle_cmd_stor(session, &path, ctx, writer).await?,
        Command::PWD => handle_cmd_pwd(session),
        Command::CWD(path) => handle_cmd_cwd(session, &path).await,
        Command::CDUP => handle_cmd_cdup(session).await,
        Command::TYPE(kind) => handle_cmd_type(&kind),
        Command::SYST => CommandResult::success(format_response(SYSTEM_TYPE, "UNIX Type: L8")),
        Command::NOOP => CommandResult::success(format_response(OK, "NOOP ok.")),
        Command::FEAT => CommandResult::success(format!(
            "{FEATURES}-Features:\r\n PASV\r\n UTF8\r\n{FEATURES} End\r\n"
        )),
        Command::NOARG(cmd) => CommandResult::failure(
            format!("{cmd} without argument"),
            format_response(BAD_ARGUMENTS, "Syntax error in parameters or arguments."),
        ),
        Command::UNKNOWN(cmd) => CommandResult::failure(
            format!("Unsupported command {cmd:?}"),
            format_response(NOT_IMPLEMENTED, "Command not implemented."),
        ),
    };
    Ok(result)
}

/// Handles USER: remembers the name and asks for a password. The reply is
/// the same whether or not the user exists.
fn handle_cmd_user(session: &mut Session, username: &str) -> CommandResult {
    if session.is_authenticated() {
        return CommandResult::failure(
            "Already logged in",
            format_response(BAD_SEQUENCE, "Already logged in."),
        );
    }
    session.begin_login(username);
    CommandResult::success(format_response(
        PASSWORD_REQUIRED,
        &format!("Password required for {username}."),
    ))
}

/// Handles PASS: authenticates the pending username. Any failure sends the
/// session back to `Connected`.
async fn handle_cmd_pass(session: &mut Session, password: &str, ctx: &ServerContext) -> CommandResult {
    let Some(username) = session.pending_username().map(str::to_string) else {
        let message = if session.is_authenticated() {
            "Already logged in."
        } else {
            "Login with USER first."
        };
        return CommandResult::failure("PASS out of sequence", format_response(BAD_SEQUENCE, message));
    };

    match ctx.authenticator.authenticate(&username, password).await {
        Ok(user) => {
            info!(
                "Client {} logged in as {} (home {})",
                session.peer_addr(),
                user.username,
                user.jailed_root.display()
            );
            session.login(user);
            CommandResult::success(format_response(
                LOGIN_SUCCESS,
                &format!("User {username} logged in."),
            ))
        }
        Err(e) => {
            warn!("Login failed for client {}: {}", session.peer_addr(), e);
            session.reset_login();
            CommandResult::failure(e.to_string(), auth_error_reply(&e))
        }
    }
}

/// Handles QUIT: closes the session from any state.
async fn handle_cmd_quit(session: &mut Session) -> CommandResult {
    session.close().await;
    CommandResult::close(format_response(GOODBYE, "Goodbye."))
}

/// Handles PASV: leases a port, starts listening on it and tells the client
/// where to connect. A previous pending listener is cancelled first.
async fn handle_cmd_pasv(session: &mut Session, ctx: &ServerContext) -> CommandResult {
    session.cancel_pending_data().await;

    match open_passive(session, ctx).await {
        Ok((channel, advertised)) => {
            let port = channel.port();
            session.set_pending_data(channel);
            info!(
                "Client {} entering passive mode on {}:{}",
                session.peer_addr(),
                advertised,
                port
            );
            CommandResult::success(format_pasv_response(advertised, port))
        }
        Err(e) => {
            warn!("PASV failed for client {}: {}", session.peer_addr(), e);
            CommandResult::failure(e.to_string(), transfer_error_reply(&e))
        }
    }
}

async fn open_passive(
    session: &Session,
    ctx: &ServerContext,
) -> Result<(PendingDataChannel, Ipv4Addr), TransferError> {
    let advertised = match ctx.passive_ip() {
        Some(ip) => ip,
        None => advertised_ipv4(session.local_addr().ip())?,
    };
    let channel = PendingDataChannel::open_in_pool(
        ctx.bind_ip(),
        &ctx.ports,
        session.id(),
        session.peer_addr().ip(),
        ctx.data_connection_timeout(),
    )
    .await?;
    Ok((channel, advertised))
}

/// PASV replies can only carry an IPv4 address.
fn advertised_ipv4(ip: IpAddr) -> Result<Ipv4Addr, TransferError> {
    match ip {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .ok_or(TransferError::UnsupportedAddress(ip)),
    }
}

/// Takes the pending passive listener for a transfer command.
fn take_data_channel(session: &mut Session) -> Result<PendingDataChannel, CommandResult> {
    session.take_pending_data().ok_or_else(|| {
        CommandResult::failure(
            "No data connection",
            transfer_error_reply(&TransferError::NoDataConnection),
        )
    })
}

fn path_failure(e: PathError) -> CommandResult {
    CommandResult::failure(e.to_string(), path_error_reply(&e))
}

/// Gives up a transfer before it starts, returning the port to the pool.
async fn abandon(channel: PendingDataChannel, e: PathError) -> CommandResult {
    channel.cancel().await;
    path_failure(e)
}

fn transfer_result(result: Result<u64, TransferError>) -> CommandResult {
    match result {
        Ok(_) => CommandResult::success(format_response(TRANSFER_COMPLETE, "Transfer complete.")),
        Err(e) => CommandResult::failure(e.to_string(), transfer_error_reply(&e)),
    }
}

/// Handles LIST: sends an `ls -l` style listing of the target (default: the
/// working directory) over the data connection.
async fn handle_cmd_list<W>(
    session: &mut Session,
    path: Option<&str>,
    writer: &mut W,
) -> io::Result<CommandResult>
where
    W: AsyncWrite + Unpin,
{
    let Some(root) = session.user().map(|u| u.jailed_root.clone()) else {
        return Ok(not_logged_in());
    };
    let channel = match take_data_channel(session) {
        Ok(channel) => channel,
        Err(result) => return Ok(result),
    };

    let listed = match resolve_in_jail(&root, session.cwd(), path.unwrap_or("")).await {
        Ok(resolved) => list_entries(&resolved).await,
        Err(e) => Err(e),
    };
    let entries = match listed {
        Ok(entries) => entries,
        Err(e) => return Ok(abandon(channel, e).await),
    };
    let listing = format_listing(&entries, Local::now());

    send_preliminary(writer, "Here comes the directory listing.").await?;
    let result = match channel.connect().await {
        Ok(conn) => send_listing(conn, &listing).await,
        Err(e) => Err(e),
    };
    Ok(transfer_result(result))
}

/// Handles RETR: streams a file from the home directory to the client.
async fn handle_cmd_retr<W>(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
    writer: &mut W,
) -> io::Result<CommandResult>
where
    W: AsyncWrite + Unpin,
{
    let Some(root) = session.user().map(|u| u.jailed_root.clone()) else {
        return Ok(not_logged_in());
    };
    let channel = match take_data_channel(session) {
        Ok(channel) => channel,
        Err(result) => return Ok(result),
    };

    let resolved = match resolve_in_jail(&root, session.cwd(), path).await {
        Ok(resolved) => resolved,
        Err(e) => return Ok(abandon(channel, e).await),
    };
    let file = match open_for_retrieval(&resolved).await {
        Ok(file) => file,
        Err(e) => return Ok(abandon(channel, e).await),
    };
    info!(
        "Client {} downloading {} ({})",
        session.peer_addr(),
        resolved.virtual_path,
        resolved.real.display()
    );

    send_preliminary(
        writer,
        &format!("Opening BINARY mode data connection for {}.", resolved.virtual_path),
    )
    .await?;
    let result = match channel.connect().await {
        Ok(conn) => send_file(conn, file, &resolved.virtual_path, ctx.buffer_size()).await,
        Err(e) => Err(e),
    };
    Ok(transfer_result(result))
}

/// Handles STOR: writes the client's upload into a new or truncated file in
/// the home directory.
async fn handle_cmd_stor<W>(
    session: &mut Session,
    path: &str,
    ctx: &ServerContext,
    writer: &mut W,
) -> io::Result<CommandResult>
where
    W: AsyncWrite + Unpin,
{
    let Some(root) = session.user().map(|u| u.jailed_root.clone()) else {
        return Ok(not_logged_in());
    };
    let channel = match take_data_channel(session) {
        Ok(channel) => channel,
        Err(result) => return Ok(result),
    };

    let resolved = match resolve_in_jail(&root, session.cwd(), path).await {
        Ok(resolved) => resolved,
        Err(e) => return Ok(abandon(channel, e).await),
    };
    let file = match create_for_storage(&resolved).await {
        Ok(file) => file,
        Err(e) => return Ok(abandon(channel, e).await),
    };
    info!(
        "Client {} uploading {} ({})",
        session.peer_addr(),
        resolved.virtual_path,
        resolved.real.display()
    );

    send_preliminary(
        writer,
        &format!("Opening BINARY mode data connection for {}.", resolved.virtual_path),
    )
    .await?;
    let result = match channel.connect().await {
        Ok(conn) => receive_file(conn, file, &resolved.virtual_path, ctx.buffer_size()).await,
        Err(e) => Err(e),
    };
    Ok(transfer_result(result))
}

async fn send_preliminary<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format_response(OPENING_DATA, message).as_bytes())
        .await?;
    writer.flush().await
}

fn not_logged_in() -> CommandResult {
    CommandResult::failure(
        "Not logged in",
        format_response(NOT_LOGGED_IN, "Please login with USER and PASS."),
    )
}

/// Handles PWD: reports the virtual working directory.
fn handle_cmd_pwd(session: &Session) -> CommandResult {
    CommandResult::success(format_response(
        PATH_CREATED,
        &format!("\"{}\" is the current directory.", session.cwd()),
    ))
}

/// Handles CWD: moves to an existing directory inside the home directory.
async fn handle_cmd_cwd(session: &mut Session, path: &str) -> CommandResult {
    let Some(user) = session.user() else {
        return not_logged_in();
    };
    match change_directory(&user.jailed_root, session.cwd(), path).await {
        Ok(cwd) => {
            let message = format!("Directory changed to {cwd}.");
            session.set_cwd(cwd);
            CommandResult::success(format_response(FILE_ACTION_OK, &message))
        }
        Err(e) => path_failure(e),
    }
}

/// Handles CDUP. At the home directory root it is a no-op.
async fn handle_cmd_cdup(session: &mut Session) -> CommandResult {
    if session.cwd() == "/" {
        return CommandResult::success(format_response(FILE_ACTION_OK, "Directory changed to /."));
    }
    handle_cmd_cwd(session, "..").await
}

/// Handles TYPE. Transfers are always binary; `A` and `I` are accepted so
/// clients can negotiate.
fn handle_cmd_type(kind: &str) -> CommandResult {
    match kind {
        "A" | "A N" | "I" | "L 8" => {
            CommandResult::success(format_response(OK, &format!("Type set to {kind}.")))
        }
        _ => CommandResult::failure(
            format!("Unsupported type {kind}"),
            format_response(PARAM_NOT_IMPLEMENTED, "Command not implemented for that parameter."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryUserStore, UserRecord};
    use crate::config::ServerConfig;
    use crate::protocol::CommandStatus;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &TempDir, min: u16, max: u16) -> ServerContext {
        context_with_users(dir, min, max, vec![UserRecord::new("1", "alice", "alice123", "alice")])
    }

    fn context_with_users(dir: &TempDir, min: u16, max: u16, users: Vec<UserRecord>) -> ServerContext {
        let store = MemoryUserStore::from_records(users).unwrap();
        let config = ServerConfig {
            bind_address: "127.0.0.1".into(),
            passive_port_min: min,
            passive_port_max: max,
            ..Default::default()
        };
        ServerContext::new(config, Arc::new(store), dir.path().to_path_buf()).unwrap()
    }

    fn session() -> Session {
        Session::new(
            1,
            "127.0.0.1:50000".parse().unwrap(),
            "127.0.0.1:2100".parse().unwrap(),
        )
    }

    async fn run(session: &mut Session, ctx: &ServerContext, line: &str) -> CommandResult {
        let mut out = Vec::new();
        handle_command(session, crate::protocol::parse_command(line), ctx, &mut out)
            .await
            .unwrap()
    }

    fn code(result: &CommandResult) -> &str {
        &result.message.as_deref().unwrap()[..3]
    }

    async fn logged_in(ctx: &ServerContext) -> Session {
        let mut s = session();
        run(&mut s, ctx, "USER alice").await;
        let result = run(&mut s, ctx, "PASS alice123").await;
        assert_eq!(code(&result), "230");
        s
    }

    #[tokio::test]
    async fn test_wrong_password_returns_to_connected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47200, 47200);
        let mut s = session();

        assert_eq!(code(&run(&mut s, &ctx, "USER alice").await), "331");
        let failed = run(&mut s, &ctx, "PASS wrong").await;
        assert_eq!(failed.message.as_deref(), Some("530 Login incorrect.\r\n"));
        assert!(!s.is_authenticated());

        // Without a new USER the session is back to Connected.
        assert_eq!(code(&run(&mut s, &ctx, "PASS alice123").await), "503");

        assert_eq!(code(&run(&mut s, &ctx, "USER mallory").await), "331");
        let unknown = run(&mut s, &ctx, "PASS alice123").await;
        assert_eq!(unknown.message, failed.message);

        run(&mut s, &ctx, "USER alice").await;
        assert_eq!(code(&run(&mut s, &ctx, "PASS alice123").await), "230");
        assert!(s.is_authenticated());
        assert_eq!(code(&run(&mut s, &ctx, "USER bob").await), "503");
    }

    #[tokio::test]
    async fn test_commands_before_login_are_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47201, 47201);
        let mut s = session();
        for line in ["PASV", "LIST", "RETR a", "STOR a", "PWD", "CWD /"] {
            assert_eq!(code(&run(&mut s, &ctx, line).await), "530", "{line}");
        }
        assert_eq!(ctx.ports.available(), 1);
        for line in ["SYST", "FEAT", "NOOP", "TYPE I", "PORT 1,2,3,4,5,6"] {
            assert_eq!(code(&run(&mut s, &ctx, line).await), "530", "{line}");
        }
        assert_eq!(code(&run(&mut s, &ctx, "USER").await), "501");
        let quit = run(&mut s, &ctx, "QUIT").await;
        assert_eq!(quit.status, CommandStatus::CloseConnection);
        assert_eq!(code(&quit), "221");
    }

    #[tokio::test]
    async fn test_passwords_are_compared_verbatim() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_users(
            &dir,
            47207,
            47207,
            vec![
                UserRecord::new("1", "carol", " pw ", "carol"),
                UserRecord::new("2", "dave", "", "dave"),
            ],
        );

        let mut carol = session();
        run(&mut carol, &ctx, "USER carol").await;
        assert_eq!(code(&run(&mut carol, &ctx, "PASS pw").await), "530");
        run(&mut carol, &ctx, "USER carol").await;
        assert_eq!(code(&run(&mut carol, &ctx, "PASS  pw \r\n").await), "230");

        let mut dave = session();
        run(&mut dave, &ctx, "USER dave").await;
        assert_eq!(code(&run(&mut dave, &ctx, "PASS x").await), "530");
        run(&mut dave, &ctx, "USER dave").await;
        assert_eq!(code(&run(&mut dave, &ctx, "PASS").await), "230");
        assert!(dave.is_authenticated());
    }

    #[tokio::test]
    async fn test_pasv_skips_port_in_use_elsewhere() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47208, 47209);
        let _squatter = std::net::TcpListener::bind(("127.0.0.1", 47208)).unwrap();
        let mut s = logged_in(&ctx).await;

        for _ in 0..3 {
            let reply = run(&mut s, &ctx, "PASV").await;
            assert_eq!(
                reply.message.as_deref(),
                Some("227 Entering Passive Mode (127,0,0,1,184,105).\r\n")
            );
        }
    }

    #[tokio::test]
    async fn test_transfer_without_pasv() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47202, 47202);
        let mut s = logged_in(&ctx).await;
        for line in ["LIST", "RETR a.txt", "STOR a.txt"] {
            assert_eq!(code(&run(&mut s, &ctx, line).await), "425", "{line}");
        }
    }

    #[tokio::test]
    async fn test_pasv_reply_and_exhaustion() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47203, 47203);
        let mut first = logged_in(&ctx).await;
        let mut second = logged_in(&ctx).await;

        let reply = run(&mut first, &ctx, "PASV").await;
        assert_eq!(
            reply.message.as_deref(),
            Some("227 Entering Passive Mode (127,0,0,1,184,99).\r\n")
        );
        assert_eq!(code(&run(&mut second, &ctx, "PASV").await), "421");

        // A repeated PASV reuses the freed port.
        assert_eq!(code(&run(&mut first, &ctx, "PASV").await), "227");
        first.cancel_pending_data().await;
        assert_eq!(code(&run(&mut second, &ctx, "PASV").await), "227");
    }

    #[tokio::test]
    async fn test_jail_escape_releases_lease() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47204, 47204);
        let mut s = logged_in(&ctx).await;

        assert_eq!(code(&run(&mut s, &ctx, "PASV").await), "227");
        assert_eq!(code(&run(&mut s, &ctx, "RETR ../../etc/passwd").await), "553");
        assert_eq!(ctx.ports.available(), 1);

        assert_eq!(code(&run(&mut s, &ctx, "PASV").await), "227");
        assert_eq!(code(&run(&mut s, &ctx, "RETR missing.txt").await), "550");
    }

    #[tokio::test]
    async fn test_directory_navigation() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47205, 47205);
        let mut s = logged_in(&ctx).await;
        std::fs::create_dir(dir.path().join("alice/docs")).unwrap();

        assert_eq!(
            run(&mut s, &ctx, "PWD").await.message.as_deref(),
            Some("257 \"/\" is the current directory.\r\n")
        );
        assert_eq!(code(&run(&mut s, &ctx, "CWD docs").await), "250");
        assert_eq!(s.cwd(), "/docs");
        assert_eq!(code(&run(&mut s, &ctx, "CWD ../..").await), "553");
        assert_eq!(code(&run(&mut s, &ctx, "CWD nope").await), "550");
        assert_eq!(code(&run(&mut s, &ctx, "CDUP").await), "250");
        assert_eq!(s.cwd(), "/");
        assert_eq!(code(&run(&mut s, &ctx, "CDUP").await), "250");
        assert_eq!(s.cwd(), "/");
    }

    #[tokio::test]
    async fn test_auxiliary_commands() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 47206, 47206);
        let mut s = logged_in(&ctx).await;
        assert_eq!(code(&run(&mut s, &ctx, "TYPE I").await), "200");
        assert_eq!(code(&run(&mut s, &ctx, "TYPE E").await), "504");
        assert_eq!(code(&run(&mut s, &ctx, "NOOP").await), "200");
        assert_eq!(code(&run(&mut s, &ctx, "RETR").await), "501");
        assert_eq!(code(&run(&mut s, &ctx, "PORT 1,2,3,4,5,6").await), "502");
        let feat = run(&mut s, &ctx, "FEAT").await;
        assert_eq!(
            feat.message.as_deref(),
            Some("211-Features:\r\n PASV\r\n UTF8\r\n211 End\r\n")
        );
    }
}
