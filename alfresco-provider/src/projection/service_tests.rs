use super::*;
use crate::accounts::{AccountInfo, AccountRoot};
use crate::projection::backend::Site;
use crate::projection::identifier::ROOT_IDENTIFIER;
use crate::sync::records::SqliteRecordStore;
use alfresco_core::{ContentInfo, PathElement, PathInfo};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::{TempDir, tempdir};
use tokio::sync::Notify;

const ACME: &str = "acme";
const REPORT_BODY: &[u8] = b"quarterly numbers";

#[derive(Default)]
struct FakeRegistry {
    accounts: Vec<AccountRoot>,
    unavailable: AtomicBool,
}

impl FakeRegistry {
    fn check(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("registry offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRegistry for FakeRegistry {
    async fn list_accounts(&self) -> Result<Vec<AccountRoot>, BackendError> {
        self.check()?;
        Ok(self.accounts.clone())
    }

    async fn find_account(&self, id: &str) -> Result<Option<AccountRoot>, BackendError> {
        self.check()?;
        Ok(self.accounts.iter().find(|a| a.id == id).cloned())
    }
}

#[derive(Default)]
struct FakeRepository {
    nodes: Mutex<HashMap<String, RemoteNode>>,
    children: Mutex<HashMap<String, Vec<String>>>,
    failures: Mutex<HashMap<String, BackendError>>,
    download_failure: Mutex<Option<BackendError>>,
    failing_downloads: Mutex<HashMap<String, BackendError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    started: Notify,
    downloads: AtomicUsize,
}

impl FakeRepository {
    fn insert(&self, node: RemoteNode) {
        self.nodes.lock().unwrap().insert(node.id.clone(), node);
    }

    fn set_children(&self, parent: &str, nodes: Vec<RemoteNode>) {
        let ids = nodes.iter().map(|n| n.id.clone()).collect();
        for node in nodes {
            self.insert(node);
        }
        self.children.lock().unwrap().insert(parent.to_string(), ids);
    }

    fn fail_node(&self, node_id: &str, err: BackendError) {
        self.failures
            .lock()
            .unwrap()
            .insert(node_id.to_string(), err);
    }

    fn fail_download(&self, node_id: &str, err: BackendError) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(node_id.to_string(), err);
    }

    fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryBackend for FakeRepository {
    async fn fetch_node(&self, _account: &str, node_id: &str) -> Result<RemoteNode, BackendError> {
        if let Some(err) = self.failures.lock().unwrap().get(node_id).cloned() {
            return Err(err);
        }
        self.nodes
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(node_id.to_string()))
    }

    async fn list_children(
        &self,
        _account: &str,
        node_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        let ids = self
            .children
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_default();
        let nodes = self.nodes.lock().unwrap();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn download_content(
        &self,
        _account: &str,
        node_id: &str,
        destination: &Path,
    ) -> Result<(), BackendError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(destination, REPORT_BODY)
            .await
            .map_err(|err| BackendError::Failed(err.to_string()))?;
        self.started.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.failing_downloads.lock().unwrap().get(node_id).cloned() {
            return Err(err);
        }
        match self.download_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct FakeSites {
    repository: Arc<FakeRepository>,
    sites: Vec<Site>,
}

#[async_trait]
impl SiteDirectory for FakeSites {
    async fn list_sites(&self, account: &str) -> Result<Vec<Site>, BackendError> {
        if account != ACME {
            return Ok(Vec::new());
        }
        Ok(self.sites.clone())
    }

    async fn list_site_roots(
        &self,
        account: &str,
        site_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        if !self.sites.iter().any(|site| site.id == site_id) {
            return Err(BackendError::NotFound(site_id.to_string()));
        }
        self.repository.list_children(account, "lib-1").await
    }
}

struct Fixture {
    service: ProjectionService,
    repository: Arc<FakeRepository>,
    registry: Arc<FakeRegistry>,
    records: Arc<SqliteRecordStore>,
    cache: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_account(account(None)).await
    }

    async fn with_account(root: AccountRoot) -> Self {
        let repository = Arc::new(FakeRepository::default());
        repository.set_children("lib-1", vec![report()]);
        let registry = Arc::new(FakeRegistry {
            accounts: vec![root],
            unavailable: AtomicBool::new(false),
        });
        let sites = Arc::new(FakeSites {
            repository: repository.clone(),
            sites: vec![Site {
                id: "teamsite".into(),
                guid: None,
                title: "teamsite".into(),
                description: None,
                visibility: Some("PRIVATE".into()),
            }],
        });
        let records = Arc::new(SqliteRecordStore::in_memory().await.unwrap());
        let cache = tempdir().unwrap();

        let service = ProjectionService::new(
            ProjectionBackends {
                accounts: registry.clone(),
                repository: repository.clone(),
                sites,
                records: records.clone(),
            },
            cache.path(),
        );
        Self {
            service,
            repository,
            registry,
            records,
            cache,
        }
    }

    fn report_path(&self) -> PathBuf {
        self.cache.path().join("acme/report-1/report.pdf")
    }
}

fn account(home_folder: Option<&str>) -> AccountRoot {
    AccountRoot {
        id: ACME.into(),
        display_name: "Acme".into(),
        server_url: "https://acme.example".into(),
        username: "admin".into(),
        password_env: None,
        home_folder: home_folder.map(str::to_string),
    }
}

fn node(id: &str, name: &str, parent: Option<&str>, is_folder: bool) -> RemoteNode {
    RemoteNode {
        id: id.into(),
        name: name.into(),
        node_type: Some(if is_folder { "cm:folder" } else { "cm:content" }.into()),
        is_folder,
        is_file: !is_folder,
        modified_at: Some("2024-03-01T10:00:00.000+0000".into()),
        parent_id: parent.map(str::to_string),
        content: (!is_folder).then(|| ContentInfo {
            mime_type: Some("application/pdf".into()),
            size_in_bytes: REPORT_BODY.len() as u64,
        }),
        path: None,
    }
}

fn in_library(mut node: RemoteNode) -> RemoteNode {
    let element = |id: &str, name: &str| PathElement {
        id: id.into(),
        name: name.into(),
    };
    node.parent_id = Some("lib-1".into());
    node.path = Some(PathInfo {
        name: Some("/Company Home/Sites/teamsite/documentLibrary".into()),
        is_complete: true,
        elements: vec![
            element("root-0", "Company Home"),
            element("sites-0", "Sites"),
            element("site-0", "teamsite"),
            element("lib-1", "documentLibrary"),
        ],
    });
    node
}

fn report() -> RemoteNode {
    in_library(node("report-1", "report.pdf", None, false))
}

fn account_id() -> ItemIdentifier {
    encode(SourceKind::Account, ACME, ACME)
}

fn site_id() -> ItemIdentifier {
    encode(SourceKind::Site, "teamsite", ACME)
}

fn node_id(id: &str) -> ItemIdentifier {
    encode(SourceKind::RemoteNode, id, ACME)
}

fn names(items: &[Item]) -> Vec<&str> {
    items.iter().map(Item::filename).collect()
}

#[tokio::test]
async fn enumerates_account_site_and_report() {
    let fx = Fixture::new().await;

    let accounts = fx.service.children(&ItemIdentifier::root()).await.unwrap();
    assert_eq!(names(&accounts), ["Acme"]);
    assert_eq!(accounts[0].item_identifier(), &account_id());

    let sites = fx.service.children(&account_id()).await.unwrap();
    assert_eq!(names(&sites), ["teamsite"]);
    assert_eq!(sites[0].source_kind(), SourceKind::Site);
    assert_eq!(sites[0].parent_item_identifier(), &account_id());

    let files = fx.service.children(&site_id()).await.unwrap();
    assert_eq!(names(&files), ["report.pdf"]);
    assert!(!files[0].is_downloaded());
    assert_eq!(files[0].parent_item_identifier(), &site_id());
    assert_eq!(files[0].size(), Some(REPORT_BODY.len() as u64));

    let empty = fx.service.children(&node_id("report-1")).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn resolving_twice_yields_equal_items() {
    let fx = Fixture::new().await;
    let id = node_id("report-1");

    let first = fx.service.item(&id).await.unwrap();
    let second = fx.service.item(&id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.filename(), second.filename());
    assert_eq!(first.parent_item_identifier(), &site_id());
    assert_eq!(first.parent_item_identifier(), second.parent_item_identifier());
    assert_eq!(first.is_downloaded(), second.is_downloaded());
}

#[tokio::test]
async fn resolved_items_match_enumerated_ones() {
    let fx = Fixture::new().await;
    for item in fx.service.children(&account_id()).await.unwrap() {
        let resolved = fx.service.item(item.item_identifier()).await.unwrap();
        assert_eq!(resolved.filename(), item.filename());
        assert_eq!(resolved.parent_item_identifier(), item.parent_item_identifier());
    }
    let account = fx.service.item(&account_id()).await.unwrap();
    assert!(account.parent_item_identifier().is_root());
}

#[tokio::test]
async fn materialize_sets_download_flag() {
    let fx = Fixture::new().await;
    let id = node_id("report-1");

    let fetched = fx.service.fetch_contents(&id).await.unwrap();

    assert_eq!(fetched.path, fx.report_path());
    assert_eq!(std::fs::read(&fetched.path).unwrap(), REPORT_BODY);
    assert!(fetched.item.is_downloaded());
    assert!(fx.service.item(&id).await.unwrap().is_downloaded());
    assert!(!partial_path(&fetched.path).exists());

    let record = fx
        .records
        .get_record(&RecordKey::new(ACME, "report-1"))
        .await
        .unwrap()
        .unwrap();
    assert!(record.downloaded);
    assert_eq!(record.parent_identifier, site_id().to_string());

    fx.service.fetch_contents(&id).await.unwrap();
    assert_eq!(fx.repository.downloads(), 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_download() {
    let fx = Fixture::new().await;
    let gate = fx.repository.gate();
    let id = node_id("report-1");

    let first = fx.service.materialize(&id);
    let second = fx.service.materialize(&id);
    assert_eq!(fx.service.in_flight(), 1);

    fx.repository.started.notified().await;
    gate.notify_one();

    let a = first.wait().await.unwrap();
    let b = second.wait().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(fx.repository.downloads(), 1);
    assert_eq!(fx.service.in_flight(), 0);
}

#[tokio::test]
async fn remote_and_synced_forms_share_one_download() {
    let fx = Fixture::new().await;
    fx.records
        .upsert_record(&SyncRecordInput {
            account_id: ACME.into(),
            node_id: "report-1".into(),
            parent_identifier: site_id().to_string(),
            name: "report.pdf".into(),
            is_folder: false,
            size: None,
            modified: None,
        })
        .await
        .unwrap();
    let gate = fx.repository.gate();
    let remote = node_id("report-1");
    let synced = encode(SourceKind::SyncedNode, "report-1", ACME);

    let first = fx.service.materialize(&remote);
    let second = fx.service.materialize(&synced);
    assert_eq!(fx.service.in_flight(), 1);
    fx.repository.started.notified().await;

    first.cancel();
    assert_eq!(
        first.wait().await.unwrap_err(),
        ProviderError::Cancelled(remote.to_string())
    );
    gate.notify_one();

    let content = second.wait().await.unwrap();
    assert_eq!(content.identifier, synced);
    assert_eq!(content.path, fx.report_path());
    assert_eq!(std::fs::read(&content.path).unwrap(), REPORT_BODY);
    assert!(!partial_path(&fx.report_path()).exists());
    assert_eq!(fx.repository.downloads(), 1);
    assert!(fx.service.item(&remote).await.unwrap().is_downloaded());
    assert!(fx.service.item(&synced).await.unwrap().is_downloaded());
}

#[tokio::test]
async fn failing_sibling_does_not_affect_other_download() {
    let fx = Fixture::new().await;
    fx.repository
        .insert(in_library(node("broken-1", "broken.pdf", None, false)));
    fx.repository
        .fail_download("broken-1", BackendError::Failed("connection reset".into()));
    let broken_path = fx.cache.path().join("acme/broken-1/broken.pdf");

    let report = fx.service.materialize(&node_id("report-1"));
    let broken = fx.service.materialize(&node_id("broken-1"));
    assert_eq!(fx.service.in_flight(), 2);

    let err = broken.wait().await.unwrap_err();
    assert!(matches!(err, ProviderError::MaterializationFailed { .. }));
    let content = report.wait().await.unwrap();

    assert_eq!(content.path, fx.report_path());
    assert!(fx.service.item(&node_id("report-1")).await.unwrap().is_downloaded());
    assert!(!broken_path.exists());
    assert!(!partial_path(&broken_path).exists());
    assert!(!fx.service.item(&node_id("broken-1")).await.unwrap().is_downloaded());
    assert_eq!(fx.repository.downloads(), 2);
}

#[tokio::test]
async fn materializing_an_unparented_node_keeps_account_listing() {
    let fx = Fixture::new().await;
    fx.repository
        .insert(node("orphan-1", "orphan.pdf", None, false));
    let orphan = node_id("orphan-1");

    fx.service.fetch_contents(&orphan).await.unwrap();

    let children = fx.service.children(&account_id()).await.unwrap();
    assert_eq!(names(&children), ["teamsite"]);
    let item = fx.service.item(&orphan).await.unwrap();
    assert!(item.is_downloaded());
    assert_eq!(item.parent_item_identifier(), &account_id());
    let synced = fx
        .service
        .item(&encode(SourceKind::SyncedNode, "orphan-1", ACME))
        .await
        .unwrap();
    assert_eq!(synced.parent_item_identifier(), &account_id());
}

#[tokio::test]
async fn failed_download_leaves_flag_untouched() {
    let fx = Fixture::new().await;
    fx.records
        .upsert_record(&SyncRecordInput {
            account_id: ACME.into(),
            node_id: "report-1".into(),
            parent_identifier: site_id().to_string(),
            name: "report.pdf".into(),
            is_folder: false,
            size: None,
            modified: None,
        })
        .await
        .unwrap();
    *fx.repository.download_failure.lock().unwrap() =
        Some(BackendError::Failed("connection reset".into()));
    let id = node_id("report-1");

    let err = fx.service.materialize(&id).wait().await.unwrap_err();

    assert!(matches!(err, ProviderError::MaterializationFailed { .. }));
    assert!(!fx.report_path().exists());
    assert!(!partial_path(&fx.report_path()).exists());
    assert!(!fx.service.item(&id).await.unwrap().is_downloaded());
}

#[tokio::test]
async fn failure_without_record_creates_none() {
    let fx = Fixture::new().await;
    *fx.repository.download_failure.lock().unwrap() =
        Some(BackendError::Unavailable("timeout".into()));

    let err = fx
        .service
        .materialize(&node_id("report-1"))
        .wait()
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let record = fx
        .records
        .get_record(&RecordKey::new(ACME, "report-1"))
        .await
        .unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn cancelled_download_discards_partial() {
    let fx = Fixture::new().await;
    let _gate = fx.repository.gate();
    let id = node_id("report-1");

    let handle = fx.service.materialize(&id);
    fx.repository.started.notified().await;
    assert!(partial_path(&fx.report_path()).exists());

    handle.cancel();
    let err = handle.wait().await.unwrap_err();

    assert_eq!(err, ProviderError::Cancelled(id.to_string()));
    assert!(!partial_path(&fx.report_path()).exists());
    assert!(!fx.report_path().exists());
    assert!(!fx.service.item(&id).await.unwrap().is_downloaded());
}

#[tokio::test]
async fn stale_download_flag_is_refetched() {
    let fx = Fixture::new().await;
    let key = RecordKey::new(ACME, "report-1");
    fx.records
        .upsert_record(&SyncRecordInput {
            account_id: ACME.into(),
            node_id: "report-1".into(),
            parent_identifier: site_id().to_string(),
            name: "report.pdf".into(),
            is_folder: false,
            size: None,
            modified: None,
        })
        .await
        .unwrap();
    fx.records
        .set_downloaded(&key, &fx.cache.path().join("gone.pdf"))
        .await
        .unwrap();

    let content = fx
        .service
        .materialize(&node_id("report-1"))
        .wait()
        .await
        .unwrap();

    assert_eq!(content.path, fx.report_path());
    assert_eq!(fx.repository.downloads(), 1);
}

#[tokio::test]
async fn materializing_containers_fails() {
    let fx = Fixture::new().await;
    for id in [account_id(), site_id()] {
        let err = fx.service.materialize(&id).wait().await.unwrap_err();
        assert!(matches!(err, ProviderError::MaterializationFailed { .. }));
    }
    assert_eq!(fx.repository.downloads(), 0);
}

#[tokio::test]
async fn unknown_identifiers_are_not_found() {
    let fx = Fixture::new().await;
    let bogus = ItemIdentifier::from("not-a-real-id");

    assert!(matches!(
        decode(bogus.as_str()),
        Err(ProviderError::MalformedIdentifier(_))
    ));
    assert!(fx.service.item(&bogus).await.unwrap_err().is_not_found());
    assert_eq!(fx.service.lookup(&bogus).await.unwrap(), None);
    assert!(fx.service.children(&bogus).await.unwrap_err().is_not_found());
    assert!(fx.service.materialize(&bogus).wait().await.unwrap_err().is_not_found());
    assert!(
        fx.service
            .item(&ItemIdentifier::from(ROOT_IDENTIFIER))
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        fx.service
            .item(&node_id("deleted-upstream"))
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        fx.service
            .item(&encode(SourceKind::Site, "nosuchsite", ACME))
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn foreign_account_identifier_does_not_enumerate() {
    let fx = Fixture::new().await;
    let foreign = encode(SourceKind::Account, "other", ACME);

    assert!(fx.service.item(&foreign).await.unwrap_err().is_not_found());
    assert!(fx.service.children(&foreign).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn access_and_availability_errors_surface() {
    let fx = Fixture::new().await;
    fx.repository
        .fail_node("secret", BackendError::AccessDenied("secret".into()));
    fx.repository
        .fail_node("flaky", BackendError::Unavailable("503".into()));

    let denied = fx.service.lookup(&node_id("secret")).await.unwrap_err();
    assert_eq!(denied, ProviderError::AccessDenied("secret".into()));
    assert!(!denied.is_retryable());

    let flaky = fx.service.item(&node_id("flaky")).await.unwrap_err();
    assert!(matches!(flaky, ProviderError::TemporarilyUnavailable(_)));
    assert!(flaky.is_retryable());
}

#[tokio::test]
async fn registry_outage_falls_back_to_persisted_accounts() {
    let fx = Fixture::new().await;
    fx.records
        .upsert_account_info(&AccountInfo {
            id: ACME.into(),
            display_name: "Acme (offline)".into(),
        })
        .await
        .unwrap();
    fx.registry.unavailable.store(true, Ordering::SeqCst);

    let accounts = fx.service.children(&ItemIdentifier::root()).await.unwrap();
    assert_eq!(names(&accounts), ["Acme (offline)"]);

    let account = fx.service.item(&account_id()).await.unwrap();
    assert_eq!(account.item_identifier(), &account_id());

    let err = fx.service.children(&account_id()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn account_lists_sites_then_home_then_synced_records() {
    let fx = Fixture::with_account(account(Some("home-1"))).await;
    fx.repository
        .insert(node("home-1", "My Files", Some("user-homes"), true));
    fx.records
        .upsert_record(&SyncRecordInput {
            account_id: ACME.into(),
            node_id: "offline-1".into(),
            parent_identifier: account_id().to_string(),
            name: "Offline".into(),
            is_folder: true,
            size: None,
            modified: Some(1_700_000_000),
        })
        .await
        .unwrap();
    let offline = encode(SourceKind::SyncedNode, "offline-1", ACME);
    fx.records
        .upsert_record(&SyncRecordInput {
            account_id: ACME.into(),
            node_id: "notes-1".into(),
            parent_identifier: offline.to_string(),
            name: "notes.txt".into(),
            is_folder: false,
            size: Some(4),
            modified: Some(1_700_000_100),
        })
        .await
        .unwrap();

    let children = fx.service.children(&account_id()).await.unwrap();
    assert_eq!(names(&children), ["teamsite", "My Files", "Offline"]);

    let home = fx.service.item(&node_id("home-1")).await.unwrap();
    assert_eq!(home.parent_item_identifier(), &account_id());

    let nested = fx.service.children(&offline).await.unwrap();
    assert_eq!(names(&nested), ["notes.txt"]);
    assert_eq!(nested[0].modified(), Some(1_700_000_100));
    assert_eq!(nested[0].parent_item_identifier(), &offline);

    let resolved = fx.service.item(nested[0].item_identifier()).await.unwrap();
    assert_eq!(resolved.parent_item_identifier(), &offline);
}

#[tokio::test]
async fn identical_filenames_are_ordered_by_identifier() {
    let fx = Fixture::new().await;
    fx.repository.set_children(
        "lib-1",
        vec![
            in_library(node("z-node", "same.txt", None, false)),
            in_library(node("m-node", "other.txt", None, false)),
            in_library(node("a-node", "same.txt", None, false)),
        ],
    );

    let children = fx.service.children(&site_id()).await.unwrap();
    let ids: Vec<_> = children.iter().map(|i| i.item_identifier().clone()).collect();
    assert_eq!(ids, [node_id("a-node"), node_id("m-node"), node_id("z-node")]);
}

#[tokio::test]
async fn invalid_children_are_skipped() {
    let fx = Fixture::new().await;
    fx.repository.set_children(
        "lib-1",
        vec![
            in_library(node("blank-1", "", None, false)),
            report(),
        ],
    );

    let children = fx.service.children(&site_id()).await.unwrap();
    assert_eq!(names(&children), ["report.pdf"]);
}

#[tokio::test]
async fn ancestors_walk_up_to_the_account() {
    let fx = Fixture::new().await;
    fx.repository
        .insert(in_library(node("folder-1", "Plans", None, true)));
    fx.repository
        .insert(node("deep-1", "plan.odt", Some("folder-1"), false));

    let chain = fx.service.ancestors(&node_id("deep-1")).await.unwrap();
    let ids: Vec<_> = chain.iter().map(|i| i.item_identifier().clone()).collect();
    assert_eq!(ids, [node_id("folder-1"), site_id(), account_id()]);
}

#[tokio::test]
async fn ancestors_reject_cycles_and_runaway_depth() {
    let fx = Fixture::new().await;
    fx.repository
        .insert(node("loop-a", "a", Some("loop-b"), true));
    fx.repository
        .insert(node("loop-b", "b", Some("loop-a"), true));
    assert!(
        fx.service
            .ancestors(&node_id("loop-a"))
            .await
            .unwrap_err()
            .is_not_found()
    );

    let depth = MAX_PARENT_DEPTH + 5;
    for level in 0..depth {
        let parent = (level + 1 < depth).then(|| format!("deep-{}", level + 1));
        fx.repository.insert(node(
            &format!("deep-{level}"),
            &format!("level {level}"),
            parent.as_deref(),
            true,
        ));
    }
    assert!(
        fx.service
            .ancestors(&node_id("deep-0"))
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(fx.service.ancestors(&node_id(&format!("deep-{}", depth - 10))).await.is_ok());
}
