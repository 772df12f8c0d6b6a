//! Shared server context
//!
//! One instance per process, handed to every session as `Arc<ServerContext>`.
//! The dataset index is immutable; the label matrix sits behind a mutex so
//! mutations, saves and projections from different sessions are serialized.

use crate::config::ServerConfig;
use crate::dataset::{DatasetIndex, Table};
use crate::delivery;
use crate::error::Result;
use crate::store::{check_writable, StoreError, TagStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tagsync_common::protocol::{Request, Response, Status};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct ServerContext {
    index: Arc<DatasetIndex>,
    store: Mutex<TagStore>,
    image_root: Option<PathBuf>,
    read_timeout: Duration,
}

impl ServerContext {
    /// Load both tables and validate the output location
    ///
    /// Any failure here is a startup error: the server must not accept
    /// connections with an unusable dataset or an unwritable output path.
    pub fn load(config: &ServerConfig) -> Result<Self> {
        info!("Loading data table from {}", config.data_path.display());
        let data = Table::read_csv(&config.data_path)?;
        info!("Loading tag metadata from {}", config.meta_path.display());
        let meta = Table::read_csv(&config.meta_path)?;

        let output_path = config.output_path();
        check_writable(&output_path)?;
        info!("Labels will be saved to {}", output_path.display());

        Self::from_tables(data, &meta, config, output_path)
    }

    /// Build from already-loaded tables
    pub fn from_tables(
        data: Table,
        meta: &Table,
        config: &ServerConfig,
        output_path: PathBuf,
    ) -> Result<Self> {
        let index = DatasetIndex::build(&data, meta, &config.columns)?;
        let label_columns = index.label_columns().iter().map(|l| l.column).collect();
        let store = TagStore::new(data, label_columns, output_path);
        info!(
            "Dataset ready: {} rows, {} tags, {} clips",
            index.data_cnt(),
            index.tag_cnt(),
            index.clips().len()
        );

        Ok(Self {
            index: Arc::new(index),
            store: Mutex::new(store),
            image_root: config.image_root.clone(),
            read_timeout: config.read_timeout(),
        })
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Current label vector of a row
    pub async fn labels(&self, row: u32) -> Option<Vec<bool>> {
        self.store.lock().await.get(row).ok()
    }

    /// Answer one request
    ///
    /// `None` means the request gets no response at all (out-of-range image).
    pub async fn handle(&self, request: Request) -> Option<Response> {
        match request {
            Request::Image { row } => {
                match delivery::deliver(&self.index, self.image_root.as_deref(), row).await {
                    Ok(bytes) => Some(Response::ImageData { row, bytes }),
                    Err(e) => {
                        warn!("Image request failed: {}", e);
                        e.into_response(row)
                    }
                }
            }
            Request::TagList => Some(Response::TagList {
                status: Status::Ok,
                aliases: self.index.aliases(),
            }),
            Request::SetTags { begin, end, values } => {
                let result = self.store.lock().await.set_range(begin, end, &values);
                if let Err(e) = &result {
                    warn!("Tag update rejected: {}", e);
                }
                Some(Response::SetTags {
                    status: result.is_ok().into(),
                })
            }
            Request::Save => {
                let store = self.store.lock().await;
                let snapshot = store.snapshot();
                // Guard held until the file lands so saves cannot overtake each other
                let result = tokio::task::spawn_blocking(move || snapshot.write())
                    .await
                    .map_err(|e| StoreError::Persist(format!("Task join error: {}", e)))
                    .and_then(|written| written);
                drop(store);
                if let Err(e) = &result {
                    error!("Save failed: {}", e);
                }
                Some(Response::Save {
                    status: result.is_ok().into(),
                })
            }
            Request::ClipLayout => Some(Response::ClipLayout {
                status: Status::Ok,
                clips: self.index.clips().to_vec(),
            }),
            Request::RowTable => {
                let rendered = self.store.lock().await.render_projection();
                Some(match rendered {
                    Ok(table) => Response::RowTable {
                        status: Status::Ok,
                        table,
                    },
                    Err(e) => {
                        error!("Cannot render row table: {}", e);
                        Response::RowTable {
                            status: Status::Failed,
                            table: String::new(),
                        }
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ServerContext {
        let data = Table::from_reader(
            "file_path,clip_id,modality,tag_code_1,tag_code_2\n\
             a.png,A,c1,False,False\n\
             b.png,A,c2,False,False\n"
                .as_bytes(),
        )
        .unwrap();
        let meta = Table::from_reader("code,alias\n1,stand\n2,sit\n".as_bytes()).unwrap();
        let config = ServerConfig {
            image_root: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };
        ServerContext::from_tables(data, &meta, &config, dir.path().join("out.csv")).unwrap()
    }

    #[tokio::test]
    async fn test_tag_list_and_layout() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        assert_eq!(
            ctx.handle(Request::TagList).await,
            Some(Response::TagList {
                status: Status::Ok,
                aliases: vec!["stand".to_string(), "sit".to_string()],
            })
        );
        match ctx.handle(Request::ClipLayout).await {
            Some(Response::ClipLayout { status, clips }) => {
                assert!(status.is_ok());
                assert_eq!(clips.len(), 1);
                assert_eq!(clips[0].view_count, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_tags_reports_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let ok = ctx
            .handle(Request::SetTags {
                begin: 0,
                end: 1,
                values: vec![true, false],
            })
            .await;
        assert_eq!(ok, Some(Response::SetTags { status: Status::Ok }));
        assert_eq!(ctx.labels(1).await, Some(vec![true, false]));

        let failed = ctx
            .handle(Request::SetTags {
                begin: 2,
                end: 7,
                values: vec![false, true],
            })
            .await;
        assert_eq!(failed, Some(Response::SetTags { status: Status::Failed }));
        assert_eq!(ctx.labels(1).await, Some(vec![true, false]));
    }

    #[tokio::test]
    async fn test_row_table_reflects_mutations() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.handle(Request::SetTags {
            begin: 1,
            end: 1,
            values: vec![false, true],
        })
        .await;

        match ctx.handle(Request::RowTable).await {
            Some(Response::RowTable { status, table }) => {
                assert!(status.is_ok());
                assert_eq!(table, "tag_code_1,tag_code_2\nFalse,False\nFalse,True\n");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_image_has_no_response() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert_eq!(ctx.handle(Request::Image { row: 2 }).await, None);
    }

    #[tokio::test]
    async fn test_save_writes_output() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        assert_eq!(
            ctx.handle(Request::Save).await,
            Some(Response::Save { status: Status::Ok })
        );
        assert!(dir.path().join("out.csv").is_file());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_save_releases_store() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        std::fs::create_dir(dir.path().join("out.csv")).unwrap();

        assert_eq!(
            ctx.handle(Request::Save).await,
            Some(Response::Save {
                status: Status::Failed
            })
        );
        let update = ctx
            .handle(Request::SetTags {
                begin: 0,
                end: 0,
                values: vec![false, true],
            })
            .await;
        assert_eq!(update, Some(Response::SetTags { status: Status::Ok }));
        assert_eq!(ctx.labels(0).await, Some(vec![false, true]));
    }

    #[test]
    fn test_load_rejects_missing_label_scheme() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data.csv"), "file_path,x\na.png,1\n").unwrap();
        std::fs::write(dir.path().join("meta.csv"), "code,alias\n1,one\n").unwrap();
        let config = ServerConfig {
            data_path: dir.path().join("data.csv"),
            meta_path: dir.path().join("meta.csv"),
            save_dir: dir.path().join("out"),
            ..ServerConfig::default()
        };
        assert!(matches!(
            ServerContext::load(&config),
            Err(crate::error::Error::Dataset(_))
        ));
    }
}
