//! Per-workspace files through which the assistant learns which
//! conversation its replies belong to.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

/// Write the most recent conversation id as plain text.
pub fn write_conversation_marker(dir: &Path, file_name: &str, conversation_id: &str) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    fs::write(&path, conversation_id)?;
    Ok(path)
}

/// Set `key=value` in the workspace `.env`, keeping every other line.
/// Returns false when the file already held that value.
pub fn update_env_key(dir: &Path, key: &str, value: &str) -> io::Result<bool> {
    let path = dir.join(".env");
    let existing = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
        Err(error) => return Err(error),
    };

    let mut lines: Vec<String> = Vec::new();
    let mut found = false;
    for line in existing.lines() {
        match parse_assignment(line) {
            Some((k, v)) if k == key => {
                if found {
                    continue;
                }
                found = true;
                if v == value {
                    return Ok(false);
                }
                lines.push(format!("{key}={value}"));
            }
            _ => lines.push(line.to_string()),
        }
    }
    if !found {
        lines.push(format!("{key}={value}"));
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(&path, contents)?;
    Ok(true)
}

fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{update_env_key, write_conversation_marker};

    #[test]
    fn marker_holds_only_the_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conversation_marker(dir.path(), ".chat", "oc_1").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "oc_1");
    }

    #[test]
    fn env_key_is_appended_to_new_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(update_env_key(dir.path(), "CHAT", "oc_1").unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "CHAT=oc_1\n"
        );
    }

    #[test]
    fn env_key_is_replaced_in_place_keeping_other_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "# settings\nAPI=x\nCHAT=old\nOTHER = y\n",
        )
        .unwrap();

        assert!(update_env_key(dir.path(), "CHAT", "new").unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "# settings\nAPI=x\nCHAT=new\nOTHER = y\n"
        );
    }

    #[test]
    fn unchanged_value_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "CHAT=same\n").unwrap();
        assert!(!update_env_key(dir.path(), "CHAT", "same").unwrap());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        assert!(write_conversation_marker(&gone, ".chat", "x").is_err());
        assert!(update_env_key(&gone, "CHAT", "x").is_err());
    }
}
