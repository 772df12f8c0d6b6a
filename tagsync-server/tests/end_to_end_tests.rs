//! End-to-end tests: a real server on a loopback port and real client sessions
//!
//! Each test builds a throwaway dataset (data table, tag metadata, image files)
//! in a temp directory, serves it, and drives it through `ClientSession`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tagsync_client::{CacheEntry, ClientConfig, ClientSession, Selection};
use tagsync_common::events::ClientEvent;
use tagsync_common::labels::parse_label;
use tagsync_common::Clip;
use tagsync_server::dataset::Table;
use tagsync_server::{Server, ServerConfig, ServerContext};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// Two clips: A has three rows (indivisible by its two views), B has two
fn write_dataset(dir: &Path) -> ServerConfig {
    let images = dir.join("images");
    std::fs::create_dir_all(&images).unwrap();
    for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        let bytes: Vec<u8> = (0..(5000 * (i + 1))).map(|j| (j % 253) as u8).collect();
        std::fs::write(images.join(format!("{}.png", name)), bytes).unwrap();
    }

    std::fs::write(
        dir.join("data.csv"),
        "file_path,clip_id,modality,tag_code_1,tag_code_2,tag_code_9\n\
         a.png,A,c1,False,False,False\n\
         b.png,A,c2,False,False,False\n\
         c.png,A,c1,False,False,False\n\
         d.png,B,c1,False,True,False\n\
         missing.png,B,c2,False,False,False\n",
    )
    .unwrap();
    std::fs::write(dir.join("meta.csv"), "code,alias\n1,standing\n2,sitting\n").unwrap();

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_path: dir.join("data.csv"),
        meta_path: dir.join("meta.csv"),
        save_dir: dir.join("out"),
        image_root: Some(images),
        read_timeout_secs: 2,
        ..ServerConfig::default()
    }
}

async fn start_server(config: &ServerConfig) -> u16 {
    let ctx = Arc::new(ServerContext::load(config).unwrap());
    let server = Server::bind(config.bind_addr(), ctx).await.unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(server.run());
    port
}

fn client_config(port: u16) -> ClientConfig {
    ClientConfig {
        port,
        read_timeout_secs: 2,
        bootstrap_retry_ms: 200,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_bootstrap_layout_and_aliases() {
    let dir = TempDir::new().unwrap();
    let config = write_dataset(dir.path());
    let port = start_server(&config).await;

    let session = ClientSession::connect(client_config(port)).await.unwrap();
    session.bootstrap().await.unwrap();

    assert_eq!(
        session.aliases().await.unwrap(),
        vec!["standing", "sitting", "9_fallback"]
    );
    assert_eq!(session.data_cnt().await, Some(5));
    assert_eq!(
        session.clips().await.unwrap(),
        vec![Clip::new(0, 3, 1), Clip::new(3, 5, 2)]
    );
    assert_eq!(session.group_count().await, 4);
    assert_eq!(session.group_rows(3).await, Some(vec![3, 4]));
    assert_eq!(session.labels(3).await, Some(vec![false, true, false]));
}

#[tokio::test]
async fn test_image_bytes_match_source_file() {
    let dir = TempDir::new().unwrap();
    let config = write_dataset(dir.path());
    let port = start_server(&config).await;

    let session = ClientSession::connect(client_config(port)).await.unwrap();
    session.bootstrap().await.unwrap();

    let expected = std::fs::read(dir.path().join("images").join("d.png")).unwrap();
    match session.fetch_image(3, WAIT).await.unwrap() {
        CacheEntry::Ready(bytes) => assert_eq!(bytes, expected),
        other => panic!("unexpected {:?}", other),
    }

    match session.fetch_image(4, WAIT).await.unwrap() {
        CacheEntry::Failed(message) => assert!(message.contains("missing.png")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_group_images_requested_once() {
    let dir = TempDir::new().unwrap();
    let config = write_dataset(dir.path());
    let port = start_server(&config).await;

    let session = ClientSession::connect(client_config(port)).await.unwrap();
    session.bootstrap().await.unwrap();
    let mut events = session.subscribe();

    assert!(session.goto_group(3).await);
    assert_eq!(session.ensure_group_images(3).await.unwrap(), 2);
    // Both rows are in flight now
    assert_eq!(session.ensure_group_images(3).await.unwrap(), 0);

    let mut settled = 0;
    let mut redraws = 0;
    while settled < 2 {
        match tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            ClientEvent::ImageReady { .. } | ClientEvent::ImageFailed { .. } => settled += 1,
            ClientEvent::Redraw { group } => {
                assert_eq!(group, 3);
                redraws += 1;
            }
            _ => {}
        }
    }
    assert!(redraws >= 1);
    assert_eq!(session.ensure_group_images(3).await.unwrap(), 0);
}

#[tokio::test]
async fn test_tag_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let config = write_dataset(dir.path());
    let port = start_server(&config).await;

    let session = ClientSession::connect(client_config(port)).await.unwrap();
    session.bootstrap().await.unwrap();
    let mut events = session.subscribe();

    // Group 3 is rows 3-4; single-select sets tag 0 only
    let outcome = session.select_tag(3, Selection::Tag(0)).await.unwrap();
    assert_eq!(outcome.mutations, 1);
    assert_eq!(outcome.saves, 1);
    assert!(session.wait_for_acks(&mut events, outcome, WAIT).await.unwrap());
    assert_eq!(session.labels(4).await, Some(vec![true, false, false]));

    let saved = Table::read_csv(&config.output_path()).unwrap();
    assert_eq!(saved.row_count(), 5);
    assert_eq!(saved.headers(), Table::read_csv(&config.data_path).unwrap().headers());
    for row in 0..5 {
        let labels: Vec<bool> = (3..6)
            .map(|col| parse_label(saved.cell(row, col).unwrap()).unwrap())
            .collect();
        assert_eq!(Some(labels), session.labels(row as u32).await);
    }
    assert_eq!(saved.cell(4, 0), Some("missing.png"));

    // A second session sees the mutation in its row table
    let other = ClientSession::connect(client_config(port)).await.unwrap();
    other.bootstrap().await.unwrap();
    assert_eq!(other.labels(3).await, Some(vec![true, false, false]));
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let dir = TempDir::new().unwrap();
    let config = write_dataset(dir.path());
    let port = start_server(&config).await;

    let session = ClientSession::connect(client_config(port)).await.unwrap();
    session.bootstrap().await.unwrap();

    session.close().await;
    assert!(!session.is_connected());
    assert!(session.request_save().await.is_err());

    session.reconnect().await.unwrap();
    assert!(session.is_connected());
    // Already connected: nothing to do
    session.reconnect().await.unwrap();

    let mut events = session.subscribe();
    let outcome = session.select_tag(0, Selection::Clear).await.unwrap();
    assert!(session.wait_for_acks(&mut events, outcome, WAIT).await.unwrap());
}
