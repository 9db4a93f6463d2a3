//! Line-protocol commands.
//!
//! A command is an ASCII name, optionally followed by a space and its
//! arguments, terminated by `0x04`. `get` takes positional arguments
//! (`get vn basic,details (id = 17) {"page":1}`); the rest take one JSON
//! object.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::config::{ClientConfig, PROTOCOL_VERSION};
use crate::error::{ApiError, QueryError};
use crate::query::{Filter, Query};
use crate::schema::Entity;

pub const TERMINATOR: u8 = 0x04;

/// Which optional sub-objects a `get` command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Basic,
    Details,
    Anime,
    Relations,
    Tags,
    Stats,
    Screens,
    Staff,
    Vn,
    Producers,
    Meas,
    Traits,
    Vns,
    Voiced,
    Instances,
    Aliases,
    Labels,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Basic => "basic",
            Flag::Details => "details",
            Flag::Anime => "anime",
            Flag::Relations => "relations",
            Flag::Tags => "tags",
            Flag::Stats => "stats",
            Flag::Screens => "screens",
            Flag::Staff => "staff",
            Flag::Vn => "vn",
            Flag::Producers => "producers",
            Flag::Meas => "meas",
            Flag::Traits => "traits",
            Flag::Vns => "vns",
            Flag::Voiced => "voiced",
            Flag::Instances => "instances",
            Flag::Aliases => "aliases",
            Flag::Labels => "labels",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of the `login` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Login {
    protocol: u32,
    client: String,
    clientver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sessiontoken: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    createsession: bool,
}

impl Login {
    /// Anonymous login.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            client: config.client_name.clone(),
            clientver: config.client_version.clone(),
            username: None,
            password: None,
            sessiontoken: None,
            createsession: false,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self.sessiontoken = None;
        self
    }

    /// Resume a session. Takes precedence over a password.
    pub fn with_session_token(mut self, username: &str, token: &str) -> Self {
        self.username = Some(username.to_string());
        self.sessiontoken = Some(token.to_string());
        self.password = None;
        self.createsession = false;
        self
    }

    /// Ask the server for a session token; needs a password.
    pub fn create_session(mut self) -> Self {
        self.createsession = true;
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.sessiontoken.as_deref()
    }

    pub fn creates_session(&self) -> bool {
        self.createsession && self.password.is_some()
    }

    /// A username needs either a password or a session token.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.username.is_some() && self.password.is_none() && self.sessiontoken.is_none() {
            return Err(ApiError::MissingCredentials);
        }
        Ok(())
    }
}

/// Paging options of a `get` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetOptions {
    pub page: u32,
    pub results: u32,
    pub sort: String,
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login(Login),
    Get {
        entity: Entity,
        flags: Vec<Flag>,
        filter: String,
        options: GetOptions,
    },
    DbStats,
    Logout,
    SetUlist {
        vn_id: u64,
        fields: Value,
    },
}

impl Command {
    /// Build a `get` from a query. The query needs a known entity and a
    /// typed filter whose fields that entity exposes; no flags means `basic`.
    pub fn get(query: &Query, flags: &[Flag]) -> Result<Self, ApiError> {
        let entity = match (query.entity(), query.route()) {
            (Some(entity), _) => entity,
            (None, Some(route)) => return Err(QueryError::UnknownRoute(route.to_string()).into()),
            (None, None) => return Err(QueryError::MissingRoute.into()),
        };
        let filter = match query.filter_ref() {
            Some(Filter::Expr(expr)) => {
                entity.check(expr)?;
                expr.to_string()
            }
            _ => return Err(QueryError::MissingFilter.into()),
        };
        let flags = if flags.is_empty() {
            vec![Flag::Basic]
        } else {
            flags.to_vec()
        };
        Ok(Command::Get {
            entity,
            flags,
            filter,
            options: GetOptions {
                page: query.page_num(),
                results: query.page_size(),
                sort: query.sort_key().to_string(),
                reverse: query.is_reversed(),
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Login(_) => "login",
            Command::Get { .. } => "get",
            Command::DbStats => "dbstats",
            Command::Logout => "logout",
            Command::SetUlist { .. } => "set",
        }
    }

    /// Wire bytes, including the terminator.
    pub fn encode(&self) -> Result<Vec<u8>, ApiError> {
        let text = match self {
            Command::Login(login) => format!("login {}", to_json(login)?),
            Command::Get {
                entity,
                flags,
                filter,
                options,
            } => {
                let flags = flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(",");
                format!("get {} {flags} {filter} {}", entity.name(), to_json(options)?)
            }
            Command::DbStats => "dbstats".to_string(),
            Command::Logout => "logout".to_string(),
            Command::SetUlist { vn_id, fields } => {
                format!("set ulist {vn_id} {}", to_json(fields)?)
            }
        };
        let mut bytes = text.into_bytes();
        bytes.push(TERMINATOR);
        Ok(bytes)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Node;
    use crate::error::ConditionError;
    use crate::query::select;
    use crate::schema::Entity;

    fn text(command: &Command) -> String {
        let bytes = command.encode().unwrap();
        assert_eq!(bytes.last(), Some(&TERMINATOR));
        String::from_utf8(bytes[..bytes.len() - 1].to_vec()).unwrap()
    }

    #[test]
    fn bare_commands() {
        assert_eq!(text(&Command::DbStats), "dbstats");
        assert_eq!(text(&Command::Logout), "logout");
    }

    #[test]
    fn anonymous_login() {
        let config = ClientConfig::builder().client("azaka", "0.1.0").build();
        let login = Login::new(&config);
        assert_eq!(
            text(&Command::Login(login)),
            r#"login {"protocol":1,"client":"azaka","clientver":"0.1.0"}"#
        );
    }

    #[test]
    fn login_with_session_request() {
        let login = Login::new(&ClientConfig::default())
            .with_credentials("user", "hunter2")
            .create_session();
        assert!(login.creates_session());
        let body = text(&Command::Login(login));
        assert!(body.contains(r#""username":"user""#));
        assert!(body.contains(r#""password":"hunter2""#));
        assert!(body.contains(r#""createsession":true"#));
    }

    #[test]
    fn username_needs_secret() {
        let mut login = Login::new(&ClientConfig::default()).with_session_token("user", "tok");
        assert!(login.validate().is_ok());
        login.sessiontoken = None;
        assert!(matches!(login.validate(), Err(ApiError::MissingCredentials)));
    }

    #[test]
    fn get_from_query() {
        let id = Entity::Vn.field("id").unwrap();
        let search = Entity::Vn.field("search").unwrap();
        let query = select(["id"])
            .from("vn")
            .unwrap()
            .filter(id.ge(1).unwrap() & search.matches("fate").unwrap())
            .page(2)
            .unwrap();
        let command = Command::get(&query, &[Flag::Basic, Flag::Details]).unwrap();
        assert_eq!(command.name(), "get");
        assert_eq!(
            text(&command),
            r#"get vn basic,details ((id >= 1) and (search ~ "fate")) {"page":2,"results":10,"sort":"id","reverse":false}"#
        );
    }

    #[test]
    fn get_defaults_to_basic_flag() {
        let query = select(["id"])
            .from("ulist-labels")
            .unwrap()
            .filter(Entity::UlistLabels.field("uid").unwrap().eq(2).unwrap());
        let text = text(&Command::get(&query, &[]).unwrap());
        assert!(text.starts_with("get ulist-labels basic (uid = 2) "));
    }

    #[test]
    fn get_requires_typed_filter_and_entity() {
        let query = select(["id"]).from("vn").unwrap();
        assert!(matches!(
            Command::get(&query, &[]),
            Err(ApiError::Query(QueryError::MissingFilter))
        ));
        let query = select(["id"])
            .from_unchecked("tag")
            .unwrap()
            .filter(Node::new("id").eq(1).unwrap());
        assert!(matches!(
            Command::get(&query, &[]),
            Err(ApiError::Query(QueryError::UnknownRoute(_)))
        ));
        let query = select(["id"]).filter(Node::new("id").eq(1).unwrap());
        assert!(matches!(
            Command::get(&query, &[]),
            Err(ApiError::Query(QueryError::MissingRoute))
        ));
    }

    #[test]
    fn get_rejects_fields_of_other_entities() {
        let query = select(["id"])
            .from("vn")
            .unwrap()
            .filter(Entity::Staff.field("aid").unwrap().eq(3).unwrap());
        assert!(matches!(
            Command::get(&query, &[]),
            Err(ApiError::Condition(ConditionError::UnknownField { ref entity, ref field }))
                if entity == "vn" && field == "aid"
        ));
    }

    #[test]
    fn set_ulist() {
        let command = Command::SetUlist {
            vn_id: 17,
            fields: serde_json::json!({"vote": 80}),
        };
        assert_eq!(command.name(), "set");
        assert_eq!(text(&command), r#"set ulist 17 {"vote":80}"#);
    }
}
