//! Property tests for the filesystem inventory.
use std::fs;
use std::os::unix::fs::PermissionsExt;

use proptest::prelude::*;
use sha2::{Digest, Sha256};
use strata::inventory::{build_inventory, mode_string, sha256_file};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn checksum_matches_content(content in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        fs::write(&path, &content).unwrap();

        let expected = format!("sha256:{}", hex::encode(Sha256::digest(&content)));
        prop_assert_eq!(sha256_file(&path).unwrap(), expected);
    }

    #[test]
    fn mode_is_four_octal_digits(mode in any::<u32>()) {
        let rendered = mode_string(mode);
        prop_assert_eq!(rendered.len(), 4);
        prop_assert_eq!(u32::from_str_radix(&rendered, 8).unwrap(), mode & 0o7777);
    }

    #[test]
    fn every_file_is_listed_once(names in proptest::collection::btree_set("[a-z]{1,8}", 1..12)) {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("opt")).unwrap();
        for name in &names {
            let path = root.join("opt").join(name);
            fs::write(&path, name.as_bytes()).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        }

        let inventory = build_inventory(&root).unwrap();

        let listed: Vec<String> = inventory.entries.iter().map(|e| e.path.clone()).collect();
        let expected: Vec<String> = names.iter().map(|n| format!("/opt/{n}")).collect();
        prop_assert_eq!(listed, expected);
        for entry in &inventory.entries {
            prop_assert_eq!(entry.mode.as_str(), "0644");
            prop_assert!(entry.checksum.starts_with("sha256:"));
        }
    }
}
