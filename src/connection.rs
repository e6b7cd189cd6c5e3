use anyhow::{Context, Result};
use log::{debug, info};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};

use crate::config::Connection;

/// Something that can answer `SHOW GRANTS FOR user@host`.
pub trait GrantSource {
    /// Grant statements in server order, empty when the user has none.
    fn show_grants(&mut self, user: &str, host: &str) -> Result<Vec<String>>;
}

pub struct DbConnection {
    conn: Conn,
}

impl DbConnection {
    /// Connects to the configured server with the given password.
    ///
    /// `connection_info` is a printable form of the target without the password.
    pub fn connect(connection: &Connection, password: &str) -> Result<Self> {
        let connection_info = connection.to_string();

        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(connection.hostname.clone()))
            .tcp_port(connection.port)
            .user(Some(connection.username.clone()))
            .pass(Some(password.to_string()))
            .db_name(Some(connection.database.clone()));

        let conn = Conn::new(opts)
            .with_context(|| format!("could not connect to {}", connection_info))?;

        info!("Connected to database: {}", connection_info);

        Ok(Self { conn })
    }
}

impl GrantSource for DbConnection {
    fn show_grants(&mut self, user: &str, host: &str) -> Result<Vec<String>> {
        debug!("show_grants: {}@{}", user, host);

        let rows = self
            .conn
            .exec::<String, _, _>("SHOW GRANTS FOR ?@?", (user.to_string(), host.to_string()))
            .with_context(|| format!("could not read grants for {}@{}", user, host))?;

        debug!("show_grants: {} row(s)", rows.len());

        Ok(rows)
    }
}
