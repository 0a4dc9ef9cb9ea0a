//! Instance configuration file (`server.properties`)
//!
//! The file is a list of `key=value` lines. Four keys are owned by the
//! manager: the game port, the RCON port and password, and the RCON enable
//! flag. Their values are always recomputed from the instance and the
//! resulting properties are hidden from callers.

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::models::{ServerInstance, ServerInstanceProperty};
use crate::storage::layout::StorageLayout;

pub const SERVER_PORT_KEY: &str = "server-port";
pub const RCON_PORT_KEY: &str = "rcon.port";
pub const RCON_PASSWORD_KEY: &str = "rcon.password";
pub const RCON_ENABLED_KEY: &str = "enable-rcon";

pub const RESERVED_KEYS: [&str; 4] = [
    SERVER_PORT_KEY,
    RCON_PORT_KEY,
    RCON_PASSWORD_KEY,
    RCON_ENABLED_KEY,
];

const PASSWORD_LENGTH: usize = 16;

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Random alphanumeric RCON password
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Reads and writes instance configuration files
#[derive(Debug, Clone)]
pub struct PropertiesManager {
    layout: StorageLayout,
}

impl PropertiesManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Key/value pairs currently in the instance's configuration file
    pub async fn read(&self, instance_id: Uuid) -> Result<Vec<(String, String)>, ManagerError> {
        let file = self.layout.instance(instance_id).properties_file();
        Ok(parse(&file.read_string().await?))
    }

    /// Build the property rows for a freshly generated configuration file.
    ///
    /// Reserved keys are overridden (or added when absent) and hidden.
    pub async fn initialize(
        &self,
        instance: &ServerInstance,
    ) -> Result<Vec<ServerInstanceProperty>, ManagerError> {
        let mut properties: Vec<ServerInstanceProperty> = self
            .read(instance.id())
            .await?
            .into_iter()
            .map(|(key, value)| ServerInstanceProperty::new(instance.id(), key, value))
            .collect();

        for (key, value) in reserved_values(instance) {
            match properties.iter_mut().find(|p| p.key == key) {
                Some(property) => {
                    property.set_value(value);
                    property.hidden = true;
                }
                None => {
                    debug!("Adding missing reserved property {}", key);
                    properties.push(ServerInstanceProperty::new(instance.id(), key, value).hidden());
                }
            }
        }

        Ok(properties)
    }

    /// Overwrite the configuration file with `properties`
    pub async fn write(
        &self,
        instance: &ServerInstance,
        properties: &[ServerInstanceProperty],
    ) -> Result<(), ManagerError> {
        let file = self.layout.instance(instance.id()).properties_file();
        file.write_string(&render(properties)).await?;
        debug!(
            "Wrote {} properties to {}",
            properties.len(),
            file.path().display()
        );
        Ok(())
    }
}

fn reserved_values(instance: &ServerInstance) -> [(&'static str, String); 4] {
    [
        (SERVER_PORT_KEY, instance.port().to_string()),
        (RCON_PORT_KEY, instance.rcon_port().to_string()),
        (RCON_PASSWORD_KEY, generate_password()),
        (RCON_ENABLED_KEY, "true".to_string()),
    ]
}

/// Parse configuration file contents, keeping first-seen key order.
/// A repeated key keeps its last value.
pub fn parse(contents: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for line in contents.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_entry(line);
        let (key, value) = (unescape(key), unescape(value));
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }
    entries
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (line[..i].trim_end(), line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest.strip_prefix(['=', ':']).unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape(s: &str, is_key: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
}

/// Render one `key=value` line per property
pub fn render(properties: &[ServerInstanceProperty]) -> String {
    let mut out = String::new();
    for property in properties {
        escape(&property.key, true, &mut out);
        out.push('=');
        escape(&property.value, false, &mut out);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::instance::sample;
    use crate::models::PropertyType;
    use tempfile::TempDir;

    const GENERATED: &str = "#Minecraft server properties\n\
        #Mon Oct 19 10:00:00 UTC 2026\n\
        enable-jmx-monitoring=false\n\
        level-type=minecraft\\:normal\n\
        motd=A Minecraft Server\n\
        server-port=9999\n\
        max-players=20\n\
        pvp=true\n";

    async fn setup(instance: &ServerInstance, contents: &str) -> (TempDir, PropertiesManager) {
        let tmp = TempDir::new().unwrap();
        let layout = StorageLayout::new(tmp.path());
        layout
            .instance(instance.id())
            .properties_file()
            .write_string(contents)
            .await
            .unwrap();
        (tmp, PropertiesManager::new(layout))
    }

    #[test]
    fn test_parse() {
        let entries = parse("a=1\n  b : two words \n# comment\n! bang\n\nc\nd  =x=y\na=3\n");
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "two words ".to_string()),
                ("c".to_string(), "".to_string()),
                ("d".to_string(), "x=y".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_escapes_round_trip() {
        let id = Uuid::new_v4();
        let properties = vec![
            ServerInstanceProperty::new(id, "level-type", "minecraft:normal"),
            ServerInstanceProperty::new(id, "motd", "a=b #1"),
        ];
        let rendered = render(&properties);
        assert_eq!(rendered, "level-type=minecraft\\:normal\nmotd=a\\=b \\#1\n");

        let parsed = parse(&rendered);
        assert_eq!(parsed[0].1, "minecraft:normal");
        assert_eq!(parsed[1].1, "a=b #1");
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password();
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password());
    }

    #[tokio::test]
    async fn test_reserved_override() {
        let instance = sample(25564);
        let (_tmp, manager) = setup(&instance, GENERATED).await;

        let properties = manager.initialize(&instance).await.unwrap();
        let get = |key: &str| properties.iter().find(|p| p.key == key).unwrap();

        assert_eq!(get(SERVER_PORT_KEY).value, "25564");
        assert_eq!(get(SERVER_PORT_KEY).property_type, PropertyType::Integer);
        assert_eq!(get(RCON_PORT_KEY).value, "25565");
        assert_eq!(get(RCON_ENABLED_KEY).value, "true");
        assert_eq!(get(RCON_PASSWORD_KEY).value.len(), 16);
        assert_eq!(get("level-type").value, "minecraft:normal");
        assert_eq!(get("max-players").property_type, PropertyType::Integer);
        assert_eq!(get("pvp").property_type, PropertyType::Boolean);

        for property in &properties {
            assert_eq!(property.hidden, is_reserved(&property.key), "{}", property.key);
            assert_eq!(property.server_instance_id, instance.id());
        }
    }

    #[tokio::test]
    async fn test_missing_reserved_keys_are_added() {
        let instance = sample(30000);
        let (_tmp, manager) = setup(&instance, "motd=hello\n").await;

        let properties = manager.initialize(&instance).await.unwrap();
        assert_eq!(properties.len(), 5);
        for key in RESERVED_KEYS {
            let property = properties.iter().find(|p| p.key == key).unwrap();
            assert!(property.hidden);
        }
    }

    #[tokio::test]
    async fn test_write_round_trip_is_idempotent() {
        let instance = sample(25564);
        let (tmp, manager) = setup(&instance, GENERATED).await;
        let file = StorageLayout::new(tmp.path())
            .instance(instance.id())
            .properties_file();

        let properties = manager.initialize(&instance).await.unwrap();
        manager.write(&instance, &properties).await.unwrap();
        let first = file.read_string().await.unwrap();
        manager.write(&instance, &properties).await.unwrap();
        assert_eq!(file.read_string().await.unwrap(), first);

        let mut expected: Vec<(String, String)> = properties
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();
        let mut reread = manager.read(instance.id()).await.unwrap();
        expected.sort();
        reread.sort();
        assert_eq!(reread, expected);
        for key in RESERVED_KEYS {
            assert!(reread.iter().any(|(k, _)| k == key));
        }
    }
}
