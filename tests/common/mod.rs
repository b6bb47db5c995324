//! Common test utilities for xdcc-dl integration tests

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use xdcc_dl::db::NewTransferRequest;
use xdcc_dl::{Config, Database, PeerId};

/// Temp workspace with a database and a config pointing into it
pub struct TestEnv {
    pub temp: TempDir,
    pub db: Arc<Database>,
    pub config: Config,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transfer.download_dir = temp.path().join("downloads");
        config.materialize.temp_dir = temp.path().join("temp");
        config.persistence.database_path = temp.path().join("xdcc-dl.db");

        let db = Arc::new(Database::new(&config.persistence.database_path).await.unwrap());
        Self { temp, db, config }
    }

    /// Record that `file_name` was requested from peer 1 on a test network
    pub async fn request(&self, file_name: &str) {
        self.db
            .insert_transfer_request(&NewTransferRequest {
                file_name: file_name.to_string(),
                peer_id: Some(PeerId(1)),
                network: Some("testnet".to_string()),
                bot: Some("TestBot".to_string()),
                pack: Some("#1".to_string()),
            })
            .await
            .unwrap();
    }

    pub fn library(&self) -> std::path::PathBuf {
        self.temp.path().join("library")
    }
}

/// Accept one connection on loopback, send `bytes`, then close
pub async fn serve_once(bytes: Vec<u8>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&bytes).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    (port, handle)
}

/// Build a stored ZIP archive in memory
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}
