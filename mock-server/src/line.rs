//! Mock of the legacy line protocol.
//!
//! Understands `login`, `dbstats`, `get vn`, `set ulist` and `logout`. The
//! `get` filter is only checked for balanced parentheses; every `get`
//! pages through the fixed catalogue.

use std::io;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TERMINATOR: u8 = 0x04;

/// Password that makes `login` fail with an `auth` error.
pub const WRONG_PASSWORD: &str = "wrong";
/// Token returned for `createsession` logins.
pub const SESSION_TOKEN: &str = "0123456789abcdef";

const FLAGS: &[&str] = &["basic", "details", "anime", "relations", "tags", "stats", "screens", "staff"];

pub async fn run_line(listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        log::debug!("line client connected from {peer}");
        tokio::spawn(async move {
            if let Err(e) = serve(stream).await {
                log::warn!("line client {peer} failed: {e}");
            }
        });
    }
}

async fn serve(mut stream: TcpStream) -> io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut logged_in = false;
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        while let Some(end) = buf.iter().position(|&b| b == TERMINATOR) {
            let frame: Vec<u8> = buf.drain(..=end).collect();
            let command = String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned();
            let (reply, close) = respond(&command, &mut logged_in);
            stream.write_all(reply.as_bytes()).await?;
            stream.write_all(&[TERMINATOR]).await?;
            if close {
                return Ok(());
            }
        }
    }
}

fn error(id: &str, msg: &str) -> String {
    format!("error {}", json!({"id": id, "msg": msg}))
}

/// The reply to one command, and whether to hang up afterwards.
pub fn respond(command: &str, logged_in: &mut bool) -> (String, bool) {
    let (name, args) = command.split_once(' ').unwrap_or((command, ""));
    log::debug!("line command '{name}'");
    match name {
        "login" => (login(args, logged_in), false),
        _ if !*logged_in => (error("needlogin", "Not logged in."), false),
        "dbstats" => (
            format!(
                "dbstats {}",
                json!({"users": 3, "threads": 1, "tags": 2712, "releases": 91234, "producers": 14823,
                       "chars": 112347, "posts": 9, "vn": 42187, "traits": 3104})
            ),
            false,
        ),
        "get" => (get(args), false),
        "set" if args.starts_with("ulist ") => ("ok".to_string(), false),
        "set" => (error("settype", "Unknown set type"), false),
        "logout" => ("ok".to_string(), true),
        _ => (error("parse", "Invalid command"), false),
    }
}

fn login(args: &str, logged_in: &mut bool) -> String {
    if *logged_in {
        return error("loggedin", "Already logged in.");
    }
    let body: Value = match serde_json::from_str(args) {
        Ok(body) => body,
        Err(_) => return error("parse", "Invalid login arguments"),
    };
    if body.get("protocol") != Some(&json!(1)) {
        return format!(
            "error {}",
            json!({"id": "badarg", "msg": "Unsupported protocol", "field": "protocol"})
        );
    }
    if body.get("password").and_then(Value::as_str) == Some(WRONG_PASSWORD) {
        return error("auth", "Wrong password");
    }
    *logged_in = true;
    if body.get("createsession") == Some(&json!(true)) {
        format!("session {SESSION_TOKEN}")
    } else {
        "ok".to_string()
    }
}

fn get(args: &str) -> String {
    let mut parts = args.splitn(3, ' ');
    let (kind, flags, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), Some(flags), Some(rest)) => (kind, flags, rest),
        _ => return error("parse", "Incomplete get command"),
    };
    if kind != "vn" {
        return error("gettype", "Unknown get type");
    }
    if let Some(flag) = flags.split(',').find(|f| !FLAGS.contains(f)) {
        return format!(
            "error {}",
            json!({"id": "getinfo", "msg": "Unknown info flag", "flag": flag})
        );
    }
    let (filter, options) = match rest.rfind(" {") {
        Some(at) => (&rest[..at], &rest[at + 1..]),
        None => (rest, "{}"),
    };
    if !balanced(filter) {
        return error("parse", "Invalid filter expression");
    }
    let options: Value = serde_json::from_str(options).unwrap_or_else(|_| json!({}));
    let page = options["page"].as_u64().unwrap_or(1).max(1) as usize;
    let results = options["results"].as_u64().unwrap_or(10).clamp(1, 25) as usize;

    let rows = crate::catalogue();
    let start = (page - 1) * results;
    let items: Vec<Value> = rows
        .iter()
        .skip(start)
        .take(results)
        .map(|row| {
            let id = row["id"].as_str().unwrap_or_default().trim_start_matches('v');
            json!({"id": id.parse::<u64>().unwrap_or_default(), "title": row["title"]})
        })
        .collect();
    let more = rows.len() > start + results;
    format!(
        "results {}",
        json!({"num": items.len(), "more": more, "items": items})
    )
}

fn balanced(filter: &str) -> bool {
    let mut depth = 0i32;
    for c in filter.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && filter.starts_with('(')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logged_in() -> bool {
        let mut state = false;
        let (reply, _) = respond(r#"login {"protocol":1,"client":"test","clientver":"0.1"}"#, &mut state);
        assert_eq!(reply, "ok");
        state
    }

    #[test]
    fn commands_need_login() {
        let mut state = false;
        let (reply, _) = respond("dbstats", &mut state);
        assert!(reply.starts_with(r#"error {"id":"needlogin""#));
    }

    #[test]
    fn session_login() {
        let mut state = false;
        let (reply, _) = respond(
            r#"login {"protocol":1,"client":"t","clientver":"1","username":"u","password":"p","createsession":true}"#,
            &mut state,
        );
        assert_eq!(reply, format!("session {SESSION_TOKEN}"));
        assert!(state);
    }

    #[test]
    fn get_pages_catalogue() {
        let mut state = logged_in();
        let (reply, _) = respond(r#"get vn basic (id >= 1) {"page":2,"results":2}"#, &mut state);
        let body: Value = serde_json::from_str(reply.strip_prefix("results ").unwrap()).unwrap();
        assert_eq!(body["num"], 2);
        assert_eq!(body["more"], true);
        assert_eq!(body["items"][0]["id"], 11);
    }

    #[test]
    fn get_rejects_bad_input() {
        let mut state = logged_in();
        assert!(respond("get release basic (id = 1) {}", &mut state).0.contains("gettype"));
        assert!(respond("get vn bogus (id = 1) {}", &mut state).0.contains("getinfo"));
        assert!(respond("get vn basic (id = 1 {}", &mut state).0.contains("parse"));
    }

    #[test]
    fn logout_hangs_up() {
        let mut state = logged_in();
        assert_eq!(respond("logout", &mut state), ("ok".to_string(), true));
    }
}
