use std::sync::Arc;

use mf_core::repository::StateStore;

pub async fn test_store() -> (Arc<StateStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("dispatcher-test.db");
    let url = db_path.to_str().unwrap().to_string();
    let store = StateStore::connect(&url).await.unwrap();
    (Arc::new(store), dir)
}
