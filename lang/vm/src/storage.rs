use std::fs;

use lang_component::{memory::Memory, value::Value};

use crate::error::RuntimeErrorKind;

/// Loads an object file into memory at `address`, one block per
/// `object … end` group, and returns the number of groups read.
pub fn load(name: &str, memory: &mut Memory, address: i64) -> Result<i64, RuntimeErrorKind> {
    let text =
        fs::read_to_string(name).map_err(|_| RuntimeErrorKind::LoadFailed(name.to_string()))?;

    let mut address = address;
    let mut count = 0;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        if line == "object" {
            memory.get_mut(address)?.clear();
        } else if line == "end" {
            address += 1;
            count += 1;
        } else {
            let (name, value) = line
                .split_once('=')
                .ok_or_else(|| RuntimeErrorKind::InvalidObjectLine(line.to_string()))?;
            memory
                .get_mut(address)?
                .fields
                .insert(name.to_string(), Value::detect(value));
        }
    }
    Ok(count)
}

/// Writes `count` blocks' fields starting at `address`, one `object … end`
/// group per block, numbers rendered in decimal.
pub fn save(name: &str, memory: &Memory, address: i64, count: i64) -> Result<(), RuntimeErrorKind> {
    let mut text = String::new();
    for index in 0..count {
        let block = memory.get(address + index)?;
        text.push_str("object\n");
        for (key, value) in &block.fields {
            text.push_str(&format!("{}={}\n", key, value.render()));
        }
        text.push_str("end\n");
    }
    fs::write(name, text).map_err(|_| RuntimeErrorKind::SaveFailed(name.to_string()))
}

#[cfg(test)]
mod storage_test {
    use super::*;

    fn scratch_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("clesh_storage_test");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut memory = Memory::new(16);
        {
            let block = memory.get_mut(3).unwrap();
            block.fields.insert("hp".to_string(), Value::Number(12));
            block
                .fields
                .insert("name".to_string(), Value::String("slime".to_string()));
        }
        memory
            .get_mut(4)
            .unwrap()
            .fields
            .insert("gold".to_string(), Value::Number(-5));

        let path = scratch_file("round_trip");
        let path = path.to_str().unwrap();
        save(path, &memory, 3, 2).unwrap();

        let mut copy = Memory::new(16);
        let count = load(path, &mut copy, 8).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            copy.get(8).unwrap().fields.get("hp"),
            Some(&Value::Number(12))
        );
        assert_eq!(
            copy.get(8).unwrap().fields.get("name"),
            Some(&Value::String("slime".to_string()))
        );
        assert_eq!(
            copy.get(9).unwrap().fields.get("gold"),
            Some(&Value::Number(-5))
        );
    }

    #[test]
    fn test_load_clears_the_destination() {
        let path = scratch_file("clears");
        std::fs::write(&path, "object\nhp=1\nend\n").unwrap();

        let mut memory = Memory::new(4);
        memory
            .get_mut(0)
            .unwrap()
            .fields
            .insert("stale".to_string(), Value::Number(9));
        load(path.to_str().unwrap(), &mut memory, 0).unwrap();
        assert!(memory.get(0).unwrap().fields.get("stale").is_none());
        assert_eq!(
            memory.get(0).unwrap().fields.get("hp"),
            Some(&Value::Number(1))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let mut memory = Memory::new(4);
        let err = load("no_such_file_anywhere", &mut memory, 0).unwrap_err();
        assert!(matches!(err, RuntimeErrorKind::LoadFailed(_)));
    }

    #[test]
    fn test_load_malformed_line() {
        let path = scratch_file("malformed");
        std::fs::write(&path, "object\nnot a pair\nend\n").unwrap();

        let mut memory = Memory::new(4);
        let err = load(path.to_str().unwrap(), &mut memory, 0).unwrap_err();
        assert!(matches!(err, RuntimeErrorKind::InvalidObjectLine(_)));
    }
}
