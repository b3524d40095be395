// tests/properties.rs

//! Properties that must hold across many package graphs.

mod common;

use common::{CHANNEL, Release, TestChannel, refs, requires, version};
use orchard::db::{PackageRegistry, SqliteRegistry};
use orchard::package::{DependencySet, ExtendedDescriptor, FileRole, Manifest};
use orchard::repository::{
    HttpRequest, HttpResponse, MemoryReleaseSource, MetadataClient, ReleaseSource,
    RestChannelSource, Transport,
};
use orchard::resolver::{
    HostEnvironment, OrderNode, ResolveOptions, Resolver, sort_for_install,
};
use orchard::transaction::{FileOperation, FileTransaction, TransactionOptions};
use orchard::{
    Config, Descriptor, Error, PackageDescriptor, PackageId, PackageKey, Policy, ReleaseState,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;

/// Dependency graphs as (package, required packages)
fn graphs() -> Vec<Vec<(&'static str, Vec<&'static str>)>> {
    vec![
        vec![("A", vec!["B"]), ("B", vec![])],
        vec![("A", vec!["B", "C"]), ("B", vec!["D"]), ("C", vec!["D"]), ("D", vec![])],
        vec![("A", vec!["B"]), ("B", vec!["C"]), ("C", vec!["A"])],
        vec![("A", vec!["B"]), ("B", vec!["A"]), ("C", vec!["A"]), ("D", vec![])],
        vec![("A", vec!["E"]), ("B", vec!["E"]), ("C", vec!["B", "A"]), ("E", vec![])],
    ]
}

fn descriptor(name: &str, requires_names: &[&str]) -> PackageDescriptor {
    let mut deps = DependencySet::new();
    for r in requires_names {
        deps = deps.require(requires(r));
    }
    ExtendedDescriptor::new(
        PackageId::new(CHANNEL, name, version("1.0"), ReleaseState::Stable),
        deps,
        Manifest::new(),
    )
    .into()
}

fn source_for(graph: &[(&str, Vec<&str>)]) -> MemoryReleaseSource {
    let mut source = MemoryReleaseSource::new();
    for (name, deps) in graph {
        source.add(descriptor(name, deps));
    }
    source
}

fn config() -> Config {
    Config {
        default_channel: CHANNEL.to_string(),
        ..Config::default()
    }
}

fn resolve_ids(
    source: &dyn ReleaseSource,
    registry: &dyn PackageRegistry,
    requests: &[&str],
) -> Vec<String> {
    let config = config();
    let env = HostEnvironment::from_config(&config);
    let resolution = Resolver::new(source, registry, &env, &config)
        .resolve(&refs(requests), &ResolveOptions::default())
        .unwrap();
    resolution.ids().iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_resolution_is_idempotent_and_duplicate_free() {
    for graph in graphs() {
        let source = source_for(&graph);
        let registry = SqliteRegistry::open_in_memory().unwrap();
        // Every package twice, once in another case
        let lower: Vec<String> = graph.iter().map(|(n, _)| n.to_lowercase()).collect();
        let mut requests: Vec<&str> = graph.iter().map(|(n, _)| *n).collect();
        requests.extend(lower.iter().map(String::as_str));

        let first = resolve_ids(&source, &registry, &requests);
        let second = resolve_ids(&source, &registry, &requests);
        assert_eq!(first, second, "graph {:?}", graph);

        let unique: HashSet<&String> = first.iter().collect();
        assert_eq!(unique.len(), first.len(), "duplicates in {:?}", first);
        assert_eq!(first.len(), graph.len());
    }
}

#[test]
fn test_install_order_respects_dependencies_outside_cycles() {
    for graph in graphs() {
        let items: Vec<PackageDescriptor> =
            graph.iter().map(|(name, deps)| descriptor(name, deps)).collect();
        let sorted = sort_for_install(items.clone());
        assert_eq!(sorted.len(), items.len());

        let position: HashMap<PackageKey, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key(), i))
            .collect();

        for item in &items {
            for dep in item.order_dependencies() {
                if !reaches(&items, &dep, &item.key()) {
                    assert!(
                        position[&dep] < position[&item.key()],
                        "{} must follow {} in {:?}",
                        item.key(),
                        dep,
                        graph
                    );
                }
            }
        }
    }
}

fn reaches(items: &[PackageDescriptor], from: &PackageKey, to: &PackageKey) -> bool {
    let mut stack = vec![from.clone()];
    let mut seen = HashSet::new();
    while let Some(key) = stack.pop() {
        if &key == to {
            return true;
        }
        if !seen.insert(key.clone()) {
            continue;
        }
        if let Some(d) = items.iter().find(|d| d.key() == key) {
            stack.extend(d.order_dependencies());
        }
    }
    false
}

#[test]
fn test_uninstall_never_strands_required_dependents() {
    let mut channel = TestChannel::new();
    channel
        .publish(Release::new("A", "1.0").require(requires("B")).file("A.php", FileRole::RuntimeCode, "a"))
        .publish(Release::new("B", "1.0").require(requires("C")).file("B.php", FileRole::RuntimeCode, "b"))
        .publish(Release::new("C", "1.0").file("C.php", FileRole::RuntimeCode, "c"))
        .publish(Release::new("D", "1.0").recommend(requires("C")).file("D.php", FileRole::RuntimeCode, "d"));

    let mut session = channel.session();
    session.install(&refs(&["A", "D"]), &Policy::default()).unwrap();

    for batch in [vec!["C"], vec!["B"], vec!["C", "B"], vec!["D"], vec!["A"], vec!["B", "C"]] {
        let before: Vec<PackageKey> = installed_keys(session.registry());
        let outcome = session.uninstall(&refs(&batch), &Policy::default());

        let after = installed_keys(session.registry());
        match outcome {
            Ok(_) => {
                for package in session.registry().installed_packages().unwrap() {
                    for dep in package.dependencies().required_packages() {
                        assert!(
                            after.contains(&dep.target_key(&package.id().channel)),
                            "{} lost {} after removing {:?}",
                            package.id(),
                            dep.name,
                            batch
                        );
                    }
                }
            }
            Err(Error::DependencyValidationFailure { .. }) => assert_eq!(before, after),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

fn installed_keys(registry: &dyn PackageRegistry) -> Vec<PackageKey> {
    let mut keys: Vec<PackageKey> = registry
        .installed_packages()
        .unwrap()
        .iter()
        .map(|p| p.key())
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_failed_preflight_leaves_filesystem_untouched() {
    let temp = TempDir::new().unwrap();
    let registry = SqliteRegistry::open_in_memory().unwrap();

    for bad_position in 0..4 {
        let root = temp.path().join(format!("run{bad_position}"));
        fs::create_dir_all(&root).unwrap();
        let existing = root.join("existing");
        fs::write(&existing, "keep").unwrap();
        let staged = root.join("staged");
        fs::write(&staged, "new").unwrap();

        let mut ops = vec![
            FileOperation::Mkdir(root.join("made")),
            FileOperation::Backup(existing.clone()),
            FileOperation::Rename {
                from: staged.clone(),
                to: root.join("made/file"),
            },
            FileOperation::Delete(existing.clone()),
        ];
        ops.insert(
            bad_position,
            FileOperation::Rename {
                from: root.join("does-not-exist"),
                to: root.join("out"),
            },
        );

        let mut tx = FileTransaction::new(None, TransactionOptions::default());
        tx.begin(false);
        for op in ops {
            tx.queue(op);
        }
        assert!(matches!(
            tx.commit(&registry),
            Err(Error::TransactionCommitFailure { .. })
        ));

        assert_eq!(fs::read_to_string(&existing).unwrap(), "keep");
        assert!(staged.exists());
        assert!(!root.join("made").exists());
        assert!(!root.join("existing.bak").exists());
        assert!(!root.join("out").exists());
    }
}

/// Serves canned bodies, or refuses connections while down
#[derive(Clone, Default)]
struct FlakyChannel {
    state: Rc<RefCell<FlakyState>>,
}

#[derive(Default)]
struct FlakyState {
    down: bool,
    calls: usize,
    bodies: HashMap<String, String>,
}

impl FlakyChannel {
    fn serve(&self, url: &str, body: &str) {
        self.state.borrow_mut().bodies.insert(url.to_string(), body.to_string());
    }

    fn set_down(&self, down: bool) {
        self.state.borrow_mut().down = down;
    }

    fn calls(&self) -> usize {
        self.state.borrow().calls
    }
}

impl Transport for FlakyChannel {
    fn get(&self, request: &HttpRequest<'_>) -> orchard::Result<HttpResponse> {
        let mut state = self.state.borrow_mut();
        state.calls += 1;
        if state.down {
            return Err(Error::TransportError {
                url: request.url.to_string(),
                reason: "connection refused".to_string(),
                connect_failed: true,
            });
        }

        let etag = "\"v1\"".to_string();
        if request.validators.and_then(|v| v.etag.as_deref()) == Some(etag.as_str()) {
            return Ok(HttpResponse {
                status: 304,
                ..Default::default()
            });
        }
        match state.bodies.get(request.url) {
            Some(body) => Ok(HttpResponse {
                status: 200,
                headers: HashMap::from([("etag".to_string(), etag)]),
                body: body.as_bytes().to_vec(),
            }),
            None => Ok(HttpResponse {
                status: 404,
                ..Default::default()
            }),
        }
    }
}

const RELEASES_A: &str = "https://pkg.example.org/rest/r/a/allreleases.json";
const RELEASE_A: &str = "https://pkg.example.org/rest/r/a/1.0.json";
const RELEASES_B: &str = "https://pkg.example.org/rest/r/b/allreleases.json";
const RELEASE_B: &str = "https://pkg.example.org/rest/r/b/1.2.json";

fn flaky_channel() -> FlakyChannel {
    let channel = FlakyChannel::default();
    channel.serve(
        RELEASES_A,
        r#"{"releases": {"version": "1.0", "state": "stable"}}"#,
    );
    channel.serve(
        RELEASE_A,
        r#"{"name": "A", "version": "1.0", "state": "stable", "schema": "2.0",
            "deps": {"required": {"type": "pkg", "name": "B", "min": "1.0"}},
            "files": [{"name": "A.php", "role": "php"}]}"#,
    );
    channel.serve(
        RELEASES_B,
        r#"{"releases": [{"version": "0.9", "state": "stable"}, {"version": "1.2", "state": "stable"}]}"#,
    );
    channel.serve(
        RELEASE_B,
        r#"{"name": "B", "version": "1.2", "state": "stable", "schema": "1.0"}"#,
    );
    channel
}

#[test]
fn test_cached_metadata_survives_a_failing_channel() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let channel = flaky_channel();

    let client = MetadataClient::with_transport(
        Box::new(channel.clone()),
        cache_dir.clone(),
        Duration::from_secs(3600),
    );
    assert!(client.retrieve(RELEASES_A, None).is_ok());
    assert_eq!(channel.calls(), 1);

    // Fresh entries never reach the network
    channel.set_down(true);
    assert!(client.retrieve(RELEASES_A, None).is_ok());
    assert_eq!(channel.calls(), 1);

    // Expired entries are served when the channel cannot be reached
    let expired = MetadataClient::with_transport(Box::new(channel.clone()), cache_dir, Duration::ZERO);
    let body = expired.retrieve(RELEASES_A, None).unwrap();
    assert!(String::from_utf8(body).unwrap().contains("1.0"));
    assert_eq!(channel.calls(), 2);

    let err = expired.retrieve(RELEASES_B, None).err().unwrap();
    assert!(err.is_connect_failure());
}

#[test]
fn test_expired_metadata_revalidates() {
    let temp = TempDir::new().unwrap();
    let channel = flaky_channel();
    let client = MetadataClient::with_transport(
        Box::new(channel.clone()),
        temp.path().join("cache"),
        Duration::ZERO,
    );

    let first = client.retrieve(RELEASE_B, None).unwrap();
    let second = client.retrieve(RELEASE_B, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(channel.calls(), 2);
}

#[test]
fn test_resolve_through_rest_channel() {
    let temp = TempDir::new().unwrap();
    let channel = flaky_channel();
    let config = Config {
        default_channel: CHANNEL.to_string(),
        ..Config::with_root(temp.path())
    };
    let client = MetadataClient::with_transport(
        Box::new(channel.clone()),
        config.cache_dir(),
        Duration::from_secs(3600),
    );
    let source = RestChannelSource::new(client, config);
    let registry = SqliteRegistry::open_in_memory().unwrap();

    let ids = resolve_ids(&source, &registry, &["A"]);
    assert_eq!(ids, vec![format!("{CHANNEL}/A-1.0"), format!("{CHANNEL}/B-1.2")]);

    // Everything is cached now
    let calls = channel.calls();
    channel.set_down(true);
    assert_eq!(resolve_ids(&source, &registry, &["A"]), ids);
    assert_eq!(channel.calls(), calls);
}
