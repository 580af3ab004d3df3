use crate::constant::{Action, CONNECT_VERSION};
use crate::error::{Error, Result};
use crate::protocol::frame::Command;
use crate::protocol::primitive::*;

fn len_u16(what: &str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::BadConfigError(format!("{what} is {len} bytes long")))
}

/// Build the connect handshake
///
/// meta: `version u16 | user_len u16 | password_len u16 | db_len u16`,
/// payload: `user ++ password ++ db`
pub fn connect(user: &str, password: &str, db: Option<&str>) -> Result<Command> {
    let db = db.unwrap_or_default();
    let mut meta = Vec::with_capacity(8);
    write_int_2(&mut meta, CONNECT_VERSION);
    write_int_2(&mut meta, len_u16("user", user.len())?);
    write_int_2(&mut meta, len_u16("password", password.len())?);
    write_int_2(&mut meta, len_u16("database", db.len())?);

    let mut payload = Vec::with_capacity(user.len() + password.len() + db.len());
    write_bytes_fix(&mut payload, user.as_bytes());
    write_bytes_fix(&mut payload, password.as_bytes());
    write_bytes_fix(&mut payload, db.as_bytes());
    Ok(Command::new(Action::Connect, meta, payload))
}

/// Decoded connect handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest<'a> {
    pub version: u16,
    pub user: &'a [u8],
    pub password: &'a [u8],
    pub db: &'a [u8],
}

/// Parse a connect handshake; used by servers and test doubles
pub fn read_connect<'a>(meta: &[u8], payload: &'a [u8]) -> Result<ConnectRequest<'a>> {
    let (version, rest) = read_int_2(meta)?;
    let (user_len, rest) = read_int_2(rest)?;
    let (password_len, rest) = read_int_2(rest)?;
    let (db_len, _) = read_int_2(rest)?;

    let (user, rest) = read_string_fix(payload, user_len as usize)?;
    let (password, rest) = read_string_fix(rest, password_len as usize)?;
    let (db, rest) = read_string_fix(rest, db_len as usize)?;
    if !rest.is_empty() {
        return Err(Error::malformed("trailing bytes after connect payload"));
    }
    Ok(ConnectRequest {
        version,
        user,
        password,
        db,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_layout() {
        let command = connect("root", "taosdata", Some("power")).unwrap();
        assert_eq!(command.action, Action::Connect);
        assert_eq!(command.meta, vec![1, 0, 4, 0, 8, 0, 5, 0]);
        assert_eq!(command.payload, b"roottaosdatapower".to_vec());

        let parsed = read_connect(&command.meta, &command.payload).unwrap();
        assert_eq!(parsed.user, b"root");
        assert_eq!(parsed.password, b"taosdata");
        assert_eq!(parsed.db, b"power");
    }

    #[test]
    fn connect_without_database() {
        let command = connect("root", "", None).unwrap();
        let parsed = read_connect(&command.meta, &command.payload).unwrap();
        assert!(parsed.db.is_empty());
        assert!(parsed.password.is_empty());
    }
}
