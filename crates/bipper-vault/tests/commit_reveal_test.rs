//! End-to-end commit/reveal behaviour on real SQLite and OpenDAL backends.

mod common;

use bipper_core::{BipperError, Outcome};
use bipper_crypto::validate_phrase;
use bipper_storage::{BlobStore, MetadataStore};
use common::*;
use proptest::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;

const LEGAL_WINNER: &str = "legal winner thank year wave sausage worth useful legal winner \
    thank year wave sausage worth useful legal winner thank year wave sausage worth title";

fn phrase(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

#[tokio::test]
async fn report_pdf_scenario() {
    let vault = memory_vault();
    let pdf = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n".to_vec();

    let p = vault.commit("report.pdf", &pdf).await.unwrap();
    let words: Vec<&str> = p.expose_secret().split(' ').collect();
    assert_eq!(words.len(), 24);
    assert!(validate_phrase(p.expose_secret()));

    let revealed = vault.reveal(&p).await.unwrap();
    assert_eq!(revealed.filename, "report.pdf");
    assert_eq!(revealed.content, pdf);

    let extended = phrase(&format!("{} extra-word", p.expose_secret()));
    let err = vault.reveal(&extended).await.unwrap_err();
    assert_eq!(err.outcome(), Outcome::InvalidPhrase);

    // Another commit's phrase opens that commit, never this one
    let other = vault.commit("notes.txt", b"unrelated").await.unwrap();
    let revealed = vault.reveal(&other).await.unwrap();
    assert_eq!(revealed.filename, "notes.txt");
    assert_ne!(revealed.content, pdf);
}

#[tokio::test]
async fn reveal_is_repeatable() {
    let vault = memory_vault();
    let p = vault.commit("a.bin", &[7u8; 4096]).await.unwrap();

    let first = vault.reveal(&p).await.unwrap();
    let second = vault.reveal(&p).await.unwrap();
    assert_eq!(first.filename, second.filename);
    assert_eq!(first.content, second.content);
}

#[tokio::test]
async fn empty_content_and_unicode_filename() {
    let vault = memory_vault();
    let p = vault.commit("über résumé ✓.txt", b"").await.unwrap();

    let revealed = vault.reveal(&p).await.unwrap();
    assert_eq!(revealed.filename, "über résumé ✓.txt");
    assert!(revealed.content.is_empty());
}

#[tokio::test]
async fn malformed_and_unknown_phrases_look_the_same() {
    let vault = memory_vault();
    vault.commit("x", b"y").await.unwrap();

    let malformed = vault.reveal(&phrase("not even close")).await.unwrap_err();
    let unknown = vault.reveal(&phrase(ZERO_ENTROPY_PHRASE)).await.unwrap_err();
    let empty = vault.reveal(&phrase("")).await.unwrap_err();

    for err in [&malformed, &unknown, &empty] {
        assert!(matches!(err, BipperError::NotFound));
        assert_eq!(err.outcome(), Outcome::InvalidPhrase);
        assert_eq!(err.outcome().message(), "invalid passphrase");
    }
}

#[tokio::test]
async fn phrase_is_hashed_verbatim() {
    let vault = memory_vault();
    let p = vault.commit("x", b"y").await.unwrap();

    let padded = phrase(&format!(" {}", p.expose_secret()));
    assert!(vault.reveal(&padded).await.is_err());

    let upper = phrase(&p.expose_secret().to_uppercase());
    assert!(vault.reveal(&upper).await.is_err());
}

#[tokio::test]
async fn identical_commits_use_fresh_nonces() {
    let tmp = TempDir::new().unwrap();
    let vault = file_vault(tmp.path());

    vault.commit("same.txt", b"same bytes").await.unwrap();
    vault.commit("same.txt", b"same bytes").await.unwrap();

    let conn = rusqlite::Connection::open(tmp.path().join("bipper.sqlite")).unwrap();
    let rows: Vec<(Vec<u8>, Vec<u8>, Vec<u8>)> = conn
        .prepare("SELECT filename, content_nonce, filename_nonce FROM blobs")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].0, rows[1].0, "encrypted filenames must differ");
    assert_ne!(rows[0].1, rows[1].1, "content nonces must differ");
    assert_ne!(rows[0].2, rows[1].2, "filename nonces must differ");
    assert_eq!(vault.blobs().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn forced_collision_is_retried_transparently() {
    let vault = vault_with(
        bipper_storage::SqliteMetadataStore::open_in_memory().unwrap(),
        bipper_storage::OpendalBlobStore::new(bipper_storage::memory_operator().unwrap()),
        ScriptedPhrases::new(&[ZERO_ENTROPY_PHRASE, ZERO_ENTROPY_PHRASE, LEGAL_WINNER]),
    );

    let first = vault.commit("first.txt", b"one").await.unwrap();
    let second = vault.commit("second.txt", b"two").await.unwrap();

    assert_eq!(first.expose_secret(), ZERO_ENTROPY_PHRASE);
    assert_eq!(second.expose_secret(), LEGAL_WINNER);

    assert_eq!(vault.reveal(&first).await.unwrap().content, b"one");
    assert_eq!(vault.reveal(&second).await.unwrap().content, b"two");

    // The colliding attempt left nothing behind
    assert_eq!(vault.blobs().list().await.unwrap().len(), 2);
    assert!(vault.metadata().staged_uploads().await.unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_collision_retries_fail_internally() {
    let vault = vault_with(
        bipper_storage::SqliteMetadataStore::open_in_memory().unwrap(),
        bipper_storage::OpendalBlobStore::new(bipper_storage::memory_operator().unwrap()),
        ScriptedPhrases::new(&[ZERO_ENTROPY_PHRASE]),
    );

    let first = vault.commit("first.txt", b"one").await.unwrap();
    let err = vault.commit("second.txt", b"two").await.unwrap_err();

    assert!(matches!(err, BipperError::DuplicateKey));
    assert_eq!(err.outcome(), Outcome::Internal);

    // The original record is untouched
    let revealed = vault.reveal(&first).await.unwrap();
    assert_eq!(revealed.filename, "first.txt");
    assert_eq!(vault.blobs().list().await.unwrap().len(), 1);
    assert!(vault.metadata().staged_uploads().await.unwrap().is_empty());
}

#[tokio::test]
async fn dead_entropy_persists_nothing() {
    let vault = vault_with(
        bipper_storage::SqliteMetadataStore::open_in_memory().unwrap(),
        bipper_storage::OpendalBlobStore::new(bipper_storage::memory_operator().unwrap()),
        DeadEntropy,
    );

    let err = vault.commit("x", b"y").await.unwrap_err();
    assert!(matches!(err, BipperError::EntropySource(_)));
    assert_eq!(err.outcome(), Outcome::Internal);
    assert!(vault.blobs().list().await.unwrap().is_empty());
    assert!(vault.metadata().recorded_addresses().await.unwrap().is_empty());
}

/// Flip one bit of the given `blobs` column of the only row.
fn flip_column(db: &std::path::Path, column: &str) {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut value: Vec<u8> = conn
        .query_row(&format!("SELECT {column} FROM blobs"), [], |row| row.get(0))
        .unwrap();
    value[0] ^= 0x01;
    conn.execute(&format!("UPDATE blobs SET {column} = ?1"), [value])
        .unwrap();
}

#[tokio::test]
async fn tampered_metadata_fails_as_invalid_phrase() {
    for column in ["filename", "content_nonce", "filename_nonce"] {
        let tmp = TempDir::new().unwrap();
        let vault = file_vault(tmp.path());
        let p = vault.commit("ledger.csv", b"a,b,c\n1,2,3\n").await.unwrap();

        flip_column(&tmp.path().join("bipper.sqlite"), column);

        let err = vault.reveal(&p).await.unwrap_err();
        assert!(
            matches!(err, BipperError::Authentication),
            "tampered {column} gave {err:?}"
        );
        assert_eq!(err.outcome(), Outcome::InvalidPhrase);
    }
}

#[tokio::test]
async fn tampered_blob_fails_as_invalid_phrase() {
    let vault = memory_vault();
    let p = vault.commit("ledger.csv", b"a,b,c\n1,2,3\n").await.unwrap();

    let address = vault.metadata().recorded_addresses().await.unwrap().remove(0);
    let mut blob = vault.blobs().read(&address).await.unwrap().unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x40;
    vault.blobs().write(&address, blob).await.unwrap();

    let err = vault.reveal(&p).await.unwrap_err();
    assert!(matches!(err, BipperError::Authentication));
    assert_eq!(err.outcome(), Outcome::InvalidPhrase);
}

#[tokio::test]
async fn missing_blob_is_internal() {
    let vault = memory_vault();
    let p = vault.commit("gone.txt", b"soon gone").await.unwrap();

    let address = vault.metadata().recorded_addresses().await.unwrap().remove(0);
    vault.blobs().delete(&address).await.unwrap();

    let err = vault.reveal(&p).await.unwrap_err();
    assert!(matches!(err, BipperError::MissingBlob(_)));
    assert_eq!(err.outcome(), Outcome::Internal);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_commit_reveal_roundtrip(
        name in "[a-zA-Z0-9._ -]{1,40}",
        content in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (filename, revealed) = rt.block_on(async {
            let vault = memory_vault();
            let p = vault.commit(&name, &content).await.unwrap();
            let revealed = vault.reveal(&p).await.unwrap();
            (revealed.filename.clone(), revealed.content)
        });
        prop_assert_eq!(filename, name);
        prop_assert_eq!(revealed, content);
    }
}
