use std::{
    collections::BTreeSet,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use p2pnet::core::{interface_name, Network, Result, MAX_NETWORKS};
use p2pnet::{
    serve, DriverError, FileStore, LinkBackend, P2pDriver, Registry, Request, Response, StateStore,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{unix::OwnedReadHalf, unix::OwnedWriteHalf, UnixListener, UnixStream},
};

/// Stand-in for the kernel: the set of veth pairs that currently exist.
#[derive(Default)]
struct FakeKernel {
    pairs: Mutex<BTreeSet<usize>>,
}

impl FakeKernel {
    fn pairs(&self) -> Vec<usize> {
        self.pairs.lock().unwrap().iter().copied().collect()
    }
}

#[async_trait]
impl LinkBackend for FakeKernel {
    async fn create_pair(&self, ordinal: usize) -> Result<()> {
        if !self.pairs.lock().unwrap().insert(ordinal) {
            return Err(DriverError::LinkExists(interface_name(ordinal, 0)));
        }
        Ok(())
    }

    async fn delete_pair(&self, ordinal: usize) -> Result<()> {
        if !self.pairs.lock().unwrap().remove(&ordinal) {
            return Err(DriverError::LinkNotFound(interface_name(ordinal, 0)));
        }
        Ok(())
    }
}

async fn start_driver(state_dir: &Path, kernel: Arc<FakeKernel>) -> Arc<P2pDriver> {
    let store = Arc::new(FileStore::init(state_dir).unwrap());
    let registry = Arc::new(Registry::new(store, kernel));
    Arc::new(P2pDriver::init(registry).await.unwrap())
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(path: &Path) -> Self {
        let (reader, writer) = UnixStream::connect(path).await.unwrap().into_split();
        Client {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn call(&mut self, req: serde_json::Value) -> Response {
        let mut line = req.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        Response::recv_from(&mut self.reader).await.unwrap()
    }
}

fn create_network(id: &str) -> serde_json::Value {
    json!({"Method": "NetworkDriver.CreateNetwork", "Body": {"NetworkID": id, "Options": {}}})
}

fn delete_network(id: &str) -> serde_json::Value {
    json!({"Method": "NetworkDriver.DeleteNetwork", "Body": {"NetworkID": id}})
}

fn create_endpoint(net: &str, ep: &str) -> serde_json::Value {
    json!({
        "Method": "NetworkDriver.CreateEndpoint",
        "Body": {"NetworkID": net, "EndpointID": ep, "Interface": {"Address": "", "MacAddress": ""}}
    })
}

fn join(net: &str, ep: &str) -> serde_json::Value {
    json!({
        "Method": "NetworkDriver.Join",
        "Body": {"NetworkID": net, "EndpointID": ep, "SandboxKey": format!("/var/run/docker/netns/{ep}")}
    })
}

/// Full request flow over a unix socket, the way the runtime drives it.
#[tokio::test]
async fn test_lifecycle_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join("state");
    let socket_path = temp_dir.path().join("p2p.sock");

    let kernel = Arc::new(FakeKernel::default());
    let driver = start_driver(&state_dir, kernel.clone()).await;

    let listener = UnixListener::bind(&socket_path).unwrap();
    let server_handle = tokio::spawn(serve(listener, driver));

    let mut client = Client::connect(&socket_path).await;

    let resp = client
        .call(json!({"Method": "NetworkDriver.GetCapabilities"}))
        .await;
    assert_eq!(
        resp,
        Response::Ok(json!({"Scope": "local", "ConnectivityScope": "local"}))
    );

    assert!(matches!(client.call(create_network("net")).await, Response::Ok(_)));
    assert_eq!(kernel.pairs(), vec![0]);

    assert!(matches!(client.call(create_endpoint("net", "A")).await, Response::Ok(_)));
    assert!(matches!(client.call(create_endpoint("net", "B")).await, Response::Ok(_)));
    assert_eq!(
        client.call(create_endpoint("net", "C")).await,
        Response::Err("P2P: 2 endpoints already attached to network net".into())
    );

    let resp = client.call(join("net", "B")).await;
    assert_eq!(
        resp,
        Response::Ok(json!({
            "InterfaceName": {"SrcName": "p2p0-1", "DstPrefix": "p2p"},
            "DisableGatewayService": true
        }))
    );

    // A garbage line is answered, not fatal to the connection.
    client.writer.write_all(b"not json\n").await.unwrap();
    let resp = Response::recv_from(&mut client.reader).await.unwrap();
    assert!(matches!(resp, Response::Err(ref e) if e.starts_with("P2P: Invalid request")));

    let resp = client.call(delete_network("net")).await;
    assert_eq!(
        resp,
        Response::Err("P2P: Network net still has 2 endpoints".into())
    );

    for ep in ["A", "B"] {
        let body = json!({"NetworkID": "net", "EndpointID": ep});
        let leave = json!({"Method": "NetworkDriver.Leave", "Body": body.clone()});
        assert!(matches!(client.call(leave).await, Response::Ok(_)));
        let del = json!({"Method": "NetworkDriver.DeleteEndpoint", "Body": body});
        assert!(matches!(client.call(del).await, Response::Ok(_)));
    }

    assert!(matches!(client.call(delete_network("net")).await, Response::Ok(_)));
    assert!(kernel.pairs().is_empty());
    assert_eq!(std::fs::read_dir(&state_dir).unwrap().count(), 0);

    server_handle.abort();
}

/// Several connections at once; every network still gets its own ordinal.
#[tokio::test]
async fn test_parallel_clients() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("p2p.sock");
    let kernel = Arc::new(FakeKernel::default());
    let driver = start_driver(&temp_dir.path().join("state"), kernel.clone()).await;

    let listener = UnixListener::bind(&socket_path).unwrap();
    let server_handle = tokio::spawn(serve(listener, driver.clone()));

    let clients: Vec<_> = (0..8)
        .map(|i| {
            let socket_path = socket_path.clone();
            tokio::spawn(async move {
                let mut client = Client::connect(&socket_path).await;
                client.call(create_network(&format!("net{i}"))).await
            })
        })
        .collect();

    for c in clients {
        assert!(matches!(c.await.unwrap(), Response::Ok(_)));
    }

    let ordinals: Vec<usize> = driver
        .registry()
        .networks()
        .await
        .iter()
        .map(|n| n.ordinal)
        .collect();
    assert_eq!(ordinals, (0..8).collect::<Vec<_>>());
    assert_eq!(kernel.pairs(), (0..8).collect::<Vec<_>>());

    server_handle.abort();
}

/// N1 (ordinal 2) and N2 (ordinal 5) survive a restart; new networks fill
/// from the bottom.
#[tokio::test]
async fn test_restart_recovery() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::init(temp_dir.path()).unwrap();
    store.save(&Network::new("N1", 2)).unwrap();
    store.save(&Network::new("N2", 5)).unwrap();

    // Pair for N1 is still in the kernel from the previous run.
    let kernel = Arc::new(FakeKernel::default());
    kernel.create_pair(2).await.unwrap();

    let driver = start_driver(temp_dir.path(), kernel.clone()).await;
    assert_eq!(kernel.pairs(), vec![2, 5]);

    let registry = driver.registry();
    assert_eq!(registry.create_network("fresh").await.unwrap().ordinal, 0);
    assert_eq!(registry.create_network("fresh2").await.unwrap().ordinal, 1);
    assert_eq!(registry.create_network("fresh3").await.unwrap().ordinal, 3);
    assert!(matches!(
        registry.create_network("N1").await,
        Err(DriverError::AlreadyExists(_))
    ));
}

/// Endpoints and their sides come back after a restart.
#[tokio::test]
async fn test_restart_keeps_endpoints() {
    let temp_dir = TempDir::new().unwrap();
    let kernel = Arc::new(FakeKernel::default());

    {
        let driver = start_driver(temp_dir.path(), kernel.clone()).await;
        let registry = driver.registry();
        registry.create_network("net").await.unwrap();
        registry
            .create_endpoint("net", "A", Some(json!({"Address": "10.9.0.0/31"})))
            .await
            .unwrap();
        registry.create_endpoint("net", "B", None).await.unwrap();
        registry.delete_endpoint("net", "A").await.unwrap();
    }

    let driver = start_driver(temp_dir.path(), kernel.clone()).await;
    let registry = driver.registry();

    let net = registry.network("net").await.unwrap();
    assert_eq!(net.endpoints.len(), 1);
    assert_eq!(net.endpoints["B"].ordinal, 1);

    let c = registry.create_endpoint("net", "C", None).await.unwrap();
    assert_eq!(c.ordinal, 0);
    assert_eq!(
        registry.join("net", "C", "/ns/c").await.unwrap().src_name,
        "p2p0-0"
    );
}

/// A record on disk that can't be trusted is skipped; the rest still load.
#[tokio::test]
async fn test_restart_skips_malformed() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::init(temp_dir.path()).unwrap();
    store.save(&Network::new("ok", 1)).unwrap();
    std::fs::write(
        temp_dir.path().join("twins"),
        json!({
            "network-id": "twins",
            "ordinal": 4,
            "endpoints": {
                "a": {"endpoint-id": "a", "ordinal": 1},
                "b": {"endpoint-id": "b", "ordinal": 1}
            }
        })
        .to_string(),
    )
    .unwrap();

    let kernel = Arc::new(FakeKernel::default());
    let driver = start_driver(temp_dir.path(), kernel.clone()).await;

    assert!(driver.registry().network("ok").await.is_some());
    assert!(driver.registry().network("twins").await.is_none());
    assert_eq!(kernel.pairs(), vec![1]);
}

/// Random-looking create/delete churn never hands out a live ordinal and
/// always picks the lowest free one.
#[tokio::test]
async fn test_ordinal_churn_matches_model() {
    let temp_dir = TempDir::new().unwrap();
    let kernel = Arc::new(FakeKernel::default());
    let driver = start_driver(temp_dir.path(), kernel.clone()).await;
    let registry = driver.registry();

    let mut live: Vec<(String, usize)> = Vec::new();
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

    for step in 0..400 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;

        let delete = !live.is_empty() && (seed % 3 == 0 || live.len() == MAX_NETWORKS);
        if delete {
            let (id, _) = live.remove((seed as usize / 3) % live.len());
            registry.delete_network(&id).await.unwrap();
        } else {
            let taken: BTreeSet<usize> = live.iter().map(|(_, o)| *o).collect();
            let expected = (0..MAX_NETWORKS).find(|o| !taken.contains(o)).unwrap();

            let id = format!("n{step}");
            let network = registry.create_network(&id).await.unwrap();
            assert_eq!(network.ordinal, expected);
            live.push((id, network.ordinal));
        }

        let mut expected_pairs: Vec<usize> = live.iter().map(|(_, o)| *o).collect();
        expected_pairs.sort();
        assert_eq!(kernel.pairs(), expected_pairs);
    }

    let stored = FileStore::init(temp_dir.path())
        .unwrap()
        .load_all()
        .unwrap()
        .count();
    assert_eq!(stored, live.len());
}

#[tokio::test]
async fn test_request_enum_round_trip_on_wire() {
    let (mut a, b) = tokio::io::duplex(256);
    let mut b = BufReader::new(b);

    let req: Request = serde_json::from_value(join("n", "e")).unwrap();
    req.send_to(&mut a).await.unwrap();

    let got = Request::recv_from(&mut b).await.unwrap().unwrap().unwrap();
    assert_eq!(got, req);
}
