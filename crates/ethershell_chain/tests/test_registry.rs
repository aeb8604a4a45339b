use std::path::Path;

use ethershell_chain::*;

const PHRASE: &str = "test test test test test test test test test test test junk";
const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const KEY_C: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

fn open(dir: &Path) -> AccountRegistry {
    AccountRegistry::open(RegistryStore::with_paths(
        dir.join("wallets.json"),
        dir.join("config.json"),
    ))
    .unwrap()
}

fn indices(registry: &AccountRegistry) -> Vec<usize> {
    registry.accounts().iter().map(|a| a.index).collect()
}

#[test]
fn test_indices_stay_dense_through_adds_and_removes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());

    registry.add_from_key(KEY_A).unwrap();
    registry.create_random(3).unwrap();
    registry.add_from_keys(&[KEY_B, KEY_C]).unwrap();
    assert_eq!(indices(&registry), (0..6).collect::<Vec<_>>());

    registry.remove(&AccountSelector::Index(2)).unwrap();
    assert_eq!(indices(&registry), (0..5).collect::<Vec<_>>());

    registry
        .remove(&AccountSelector::Indices(vec![4, 0, 4]))
        .unwrap();
    assert_eq!(indices(&registry), (0..3).collect::<Vec<_>>());
}

#[test]
fn test_re_adding_a_key_fails_without_changing_size() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    registry.add_from_key(KEY_A).unwrap();

    let uppercase = KEY_A.trim_start_matches("0x").to_uppercase();
    let err = registry.add_from_key(&uppercase).unwrap_err();
    assert!(matches!(err, ChainError::DuplicateKey { index: 0 }));
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_repeated_mnemonic_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    registry.add_from_mnemonic(PHRASE, 5).unwrap();

    let err = registry.add_from_mnemonic(PHRASE, 3).unwrap_err();
    assert!(matches!(err, ChainError::DuplicatePhrase { index: 0 }));
    assert_eq!(registry.len(), 5);
}

#[test]
fn test_removing_an_index_shifts_later_accounts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    let added = registry.add_from_keys(&[KEY_A, KEY_B, KEY_C]).unwrap();

    registry.remove(&AccountSelector::Index(1)).unwrap();
    let addresses: Vec<_> = registry.accounts().iter().map(|a| a.address).collect();
    assert_eq!(addresses, vec![added[0].address, added[2].address]);
    assert_eq!(registry.get(1).unwrap().index, 1);
}

#[test]
fn test_removing_first_and_last_of_three_leaves_middle_at_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    let added = registry.add_from_keys(&[KEY_A, KEY_B, KEY_C]).unwrap();

    let removed = registry.remove(&AccountSelector::Indices(vec![0, 2])).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(registry.len(), 1);
    let only = registry.get(0).unwrap();
    assert_eq!(only.address, added[1].address);
    assert_eq!(only.index, 0);
}

#[test]
fn test_removing_the_default_clears_it() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    let added = registry.add_from_keys(&[KEY_A, KEY_B]).unwrap();
    assert_eq!(registry.default_account().unwrap().address, added[0].address);

    registry.remove(&AccountSelector::Address(added[0].address)).unwrap();
    assert!(registry.default_account().is_none());

    let reopened_config = RegistryStore::with_paths(
        tmp.path().join("wallets.json"),
        tmp.path().join("config.json"),
    )
    .load_config()
    .unwrap();
    assert!(reopened_config.default_wallet.is_none());
}

#[test]
fn test_removing_all_empties_registry_and_default() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    registry.add_from_mnemonic(PHRASE, 3).unwrap();

    let removed = registry.remove(&AccountSelector::All).unwrap();
    assert_eq!(removed.len(), 3);
    assert!(registry.is_empty());
    assert!(registry.default_account().is_none());
}

#[test]
fn test_persist_and_reload_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let before: Vec<AccountRecord> = {
        let mut registry = open(tmp.path());
        registry.add_from_key(KEY_A).unwrap();
        registry.add_from_mnemonic(PHRASE, 2).unwrap_err();
        registry.create_random_hd(2).unwrap();
        registry.create_random(1).unwrap();
        registry.accounts().to_vec()
    };

    let registry = open(tmp.path());
    assert_eq!(registry.accounts(), before.as_slice());
    for (loaded, saved) in registry.accounts().iter().zip(&before) {
        assert_eq!(loaded.address, saved.address);
        assert_eq!(loaded.kind, saved.kind);
        assert_eq!(loaded.private_key, saved.private_key);
    }
    assert_eq!(registry.list(AccountView::Hd).accounts.len(), 2);
    assert_eq!(registry.list(AccountView::Flat).accounts.len(), 2);
    assert_eq!(registry.default_account().unwrap().index, 0);
}

#[test]
fn test_listing_carries_the_safety_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = open(tmp.path());
    let listing = registry.list(AccountView::All);
    assert!(listing.accounts.is_empty());
    assert_eq!(listing.warning, UNSAFE_WARNING);
}

#[cfg(unix)]
#[test]
fn test_wallet_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let mut registry = open(tmp.path());
    registry.create_random(1).unwrap();
    let mode = std::fs::metadata(tmp.path().join("wallets.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}
