use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_router_relay::json_ext::Object;
use apollo_router_relay::json_ext::Path;
use apollo_router_relay::Context;
use apollo_router_relay::FnLoader;
use apollo_router_relay::LoaderStrategy;
use apollo_router_relay::NodeRegistry;
use apollo_router_relay::NodeTypeDescriptor;
use apollo_router_relay::PageInfo;
use apollo_router_relay::Relay;
use apollo_router_relay::RelayConfiguration;
use apollo_router_relay::connection::offset_to_cursor;
use serde_json::Value;
use serde_json::json;
use test_log::test;
use tower::BoxError;

const CONFIGURATION: &str = r#"
client_mutation_id: required
brand_loaded_objects: true
nodes_on_connection: true
"#;

fn people() -> Vec<Value> {
    vec![
        json!({ "id": 1, "name": "Ada", "friends": [2, 3] }),
        json!({ "id": 2, "name": "Grace", "friends": [1] }),
        json!({ "id": 3, "name": "Barbara", "friends": [] }),
    ]
}

fn relay(calls: Arc<AtomicUsize>) -> Relay {
    let mut registry = NodeRegistry::new();
    registry
        .register(
            NodeTypeDescriptor::builder()
                .name("Person")
                .references(vec!["PersonRow".to_string()])
                .loader(LoaderStrategy::batched(FnLoader::new(
                    move |ids: Vec<String>, _context: Context| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            let rows = people();
                            Ok::<_, BoxError>(
                                ids.iter()
                                    .map(|id| {
                                        rows.iter()
                                            .find(|row| row["id"].to_string() == *id)
                                            .cloned()
                                    })
                                    .collect(),
                            )
                        }
                    },
                )))
                .build(),
        )
        .unwrap();

    Relay::new(
        RelayConfiguration::from_yaml(CONFIGURATION).unwrap(),
        registry,
    )
}

/// Resolves `{ node(id:) { ... on Person { id name friends(first: 2) { ... } } } }` the way
/// an execution engine would, one field at a time.
async fn person_with_friends(relay: &Relay, context: &Context, global_id: &str) -> Value {
    let path = Path::from_keys(["node"]);
    let person = relay.node(context, &path, global_id).await.unwrap().unwrap();
    let typename = relay.resolve_type(context, &person).unwrap();

    let friend_ids: Vec<String> = person["friends"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| relay.encode(&typename, &id.to_string()))
        .collect();
    let friends = relay
        .nodes(context, &path.join_key("friends"), &friend_ids)
        .await;
    assert!(friends.errors.is_empty());

    let connection = relay
        .connection_builder("PersonConnection", typename.as_str())
        .from_items(
            Some(
                friends
                    .nodes
                    .into_iter()
                    .map(|friend| {
                        friend.map(|friend| {
                            json!({
                                "id": relay.global_id_of("Person", &friend).unwrap(),
                                "name": friend["name"],
                            })
                        })
                    })
                    .collect(),
            ),
            |index, _| offset_to_cursor(index),
            PageInfo::default(),
        )
        .unwrap();

    json!({
        "__typename": typename,
        "id": relay.global_id_of(&typename, &person).unwrap(),
        "name": person["name"],
        "friends": connection,
    })
}

#[test(tokio::test)]
async fn node_query_with_connection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = relay(calls.clone());
    let context = Context::new();

    let response = person_with_friends(&relay, &context, &relay.encode("Person", "1")).await;

    insta::assert_json_snapshot!(response, @r###"
    {
      "__typename": "Person",
      "id": "UGVyc29uOjE=",
      "name": "Ada",
      "friends": {
        "pageInfo": {
          "hasNextPage": false,
          "hasPreviousPage": false,
          "startCursor": "T2Zmc2V0Q29ubmVjdGlvbjow",
          "endCursor": "T2Zmc2V0Q29ubmVjdGlvbjox"
        },
        "edges": [
          {
            "cursor": "T2Zmc2V0Q29ubmVjdGlvbjow",
            "node": {
              "id": "UGVyc29uOjI=",
              "name": "Grace"
            }
          },
          {
            "cursor": "T2Zmc2V0Q29ubmVjdGlvbjox",
            "node": {
              "id": "UGVyc29uOjM=",
              "name": "Barbara"
            }
          }
        ],
        "nodes": [
          {
            "id": "UGVyc29uOjI=",
            "name": "Grace"
          },
          {
            "id": "UGVyc29uOjM=",
            "name": "Barbara"
          }
        ]
      }
    }
    "###);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Everything is cached for the rest of the request.
    person_with_friends(&relay, &context, &relay.encode("Person", "2")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A new request starts from scratch.
    person_with_friends(&relay, &Context::new(), &relay.encode("Person", "2")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test(tokio::test)]
async fn concurrent_requests_stay_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = relay(calls.clone());

    let requests: Vec<_> = (0..8)
        .map(|request| {
            let relay = relay.clone();
            tokio::spawn(async move {
                let context = Context::new();
                let ids = vec![
                    relay.encode("Person", "1"),
                    relay.encode("Person", "2"),
                    relay.encode("Person", "1"),
                ];
                let first_path = Path::from_keys(["a"]);
                let second_path = Path::from_keys(["b"]);
                let (first, second) = tokio::join!(
                    relay.nodes(&context, &first_path, &ids),
                    relay.nodes(&context, &second_path, &ids[..2]),
                );
                (request, first, second)
            })
        })
        .collect();

    for request in futures::future::join_all(requests).await {
        let (_, first, second) = request.unwrap();
        let names = |nodes: &[Option<Arc<Value>>]| {
            nodes
                .iter()
                .map(|node| node.as_ref().unwrap()["name"].clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(&first.nodes),
            vec![json!("Ada"), json!("Grace"), json!("Ada")]
        );
        assert_eq!(names(&second.nodes), vec![json!("Ada"), json!("Grace")]);
    }
    // One batch per request.
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[test(tokio::test)]
async fn aliased_mutations_echo_their_own_client_mutation_id() {
    let relay = relay(Arc::new(AtomicUsize::new(0)));
    let rename = relay.mutation_field(
        "renamePerson",
        |input: Object, _context: Context| async move {
            let delay = if input["name"] == "slow" { 30 } else { 0 };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok::<_, BoxError>(json!({ "person": { "name": input["name"] } }))
        },
    );
    assert_eq!(rename.input_type_name(), "RenamePersonInput");
    assert_eq!(rename.payload_type_name(), "RenamePersonPayload");

    let context = Context::new();
    let mutations = [("slow", "first-token"), ("fast", "second-token")];
    let paths: Vec<Path> = mutations
        .iter()
        .map(|(alias, _)| Path::from_keys([*alias]))
        .collect();
    let arguments: Vec<Object> = mutations
        .iter()
        .map(|(name, token)| {
            json!({ "input": { "name": name, "clientMutationId": token } })
                .as_object()
                .unwrap()
                .clone()
        })
        .collect();

    let payloads = futures::future::join_all(
        paths
            .iter()
            .zip(&arguments)
            .map(|(path, arguments)| rename.resolve(&context, path, arguments)),
    )
    .await;

    let response: Vec<Value> = paths
        .iter()
        .zip(payloads)
        .map(|(path, payload)| {
            let mut payload = payload.unwrap();
            payload["clientMutationId"] = rename
                .resolve_client_mutation_id(&context, &path.join_key("clientMutationId"))
                .unwrap();
            payload
        })
        .collect();

    assert_eq!(
        response,
        vec![
            json!({ "person": { "name": "slow" }, "clientMutationId": "first-token" }),
            json!({ "person": { "name": "fast" }, "clientMutationId": "second-token" }),
        ]
    );
}
