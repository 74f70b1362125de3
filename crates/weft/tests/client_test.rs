//! End-to-end client tests over a scripted transport

use std::sync::Arc;

use serde_json::json;
use url::Url;
use weft::{
    Client, Error, ErrorDomain, Field, KeyFormat, Method, ResourceSchema, SerializeOptions,
    Serializer, Deserializer, Registry, ToOneValue, ValueFormatterRegistry,
};
use wire::MockTransport;

fn client() -> (Arc<MockTransport>, Client) {
    let mock = Arc::new(MockTransport::new());
    let client = Client::builder(Url::parse("http://example.com").unwrap(), mock.clone())
        .key_format(KeyFormat::Dasherized)
        .register(ResourceSchema::new(
            "foos",
            vec![
                Field::attribute("string_attribute"),
                Field::attribute("integer_attribute"),
                Field::to_one("to_one_attribute", "bars"),
                Field::to_many("to_many_attribute", "bars"),
            ],
        ))
        .register(ResourceSchema::new(
            "bars",
            vec![Field::attribute("name")],
        ))
        .build();
    (mock, client)
}

fn bar(client: &Client, id: &str) -> weft::ResourceHandle {
    let bar = client.instantiate("bars").unwrap();
    bar.set_id(id);
    bar
}

#[tokio::test]
async fn test_find_one_maps_document_onto_graph() {
    let (mock, client) = client();
    mock.queue_response(
        200,
        json!({
            "data": {
                "type": "foos",
                "id": "1",
                "attributes": {"string-attribute": "stringValue"},
                "relationships": {
                    "to-one-attribute": {
                        "links": {"related": "http://example.com/foos/1/to-one-attribute"},
                        "data": {"type": "bars", "id": "10"},
                    }
                },
            }
        }),
    );

    let foo = client.find_one_by_id("foos", "1").await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].url, "http://example.com/foos/1");

    assert!(foo.is_loaded());
    assert_eq!(foo.id().as_deref(), Some("1"));
    assert_eq!(
        foo.attribute("string_attribute").unwrap().as_str(),
        Some("stringValue")
    );

    let to_one = foo.to_one("to_one_attribute");
    let stub = to_one.resource().unwrap();
    assert_eq!(stub.type_name(), "bars");
    assert_eq!(stub.id().as_deref(), Some("10"));
    assert!(!stub.is_loaded());
    assert_eq!(
        stub.url().unwrap().as_str(),
        "http://example.com/foos/1/to-one-attribute"
    );
}

#[tokio::test]
async fn test_save_new_resource_posts_without_id() {
    let (mock, client) = client();
    mock.queue_response(
        201,
        json!({
            "data": {
                "type": "foos",
                "id": "42",
                "links": {"self": "http://example.com/foos/42"},
                "attributes": {"string-attribute": "stringValue"},
            }
        }),
    );

    let foo = client.instantiate("foos").unwrap();
    foo.set_attribute("string_attribute", "stringValue");
    client.save(&foo).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 1, "creates do not cascade");
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url, "http://example.com/foos");

    let body = requests[0].body.clone().unwrap();
    assert_eq!(body["data"]["type"], "foos");
    assert!(body["data"].get("id").is_none());
    assert_eq!(body["data"]["attributes"]["string-attribute"], "stringValue");

    // The server-assigned identity flowed back into the same instance.
    assert_eq!(foo.id().as_deref(), Some("42"));
    assert_eq!(foo.url().unwrap().as_str(), "http://example.com/foos/42");
    assert!(foo.is_loaded());
    assert!(foo.dirty_fields().is_empty());
}

#[tokio::test]
async fn test_save_cascade_runs_in_order() {
    let (mock, client) = client();
    mock.queue_response(200, json!({"data": {"type": "foos", "id": "1"}}));
    mock.queue_empty_response(204);
    mock.queue_empty_response(204);
    mock.queue_empty_response(204);

    let foo = client.instantiate("foos").unwrap();
    foo.set_id("1");
    foo.set_to_one("to_one_attribute", ToOneValue::Linked(bar(&client, "10")));

    let collection = foo.to_many_or_empty("to_many_attribute");
    let existing = bar(&client, "11");
    collection.add_resource_as_existing(&existing);
    collection.add_resource(&bar(&client, "13"));
    collection.remove_resource(&existing);

    client.save(&foo).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 4);

    assert_eq!(requests[0].method, Method::Patch);
    assert_eq!(requests[0].url, "http://example.com/foos/1");

    assert_eq!(requests[1].method, Method::Patch);
    assert_eq!(
        requests[1].url,
        "http://example.com/foos/1/relationships/to-one-attribute"
    );
    assert_eq!(
        requests[1].body,
        Some(json!({"data": {"type": "bars", "id": "10"}}))
    );

    assert_eq!(requests[2].method, Method::Post);
    assert_eq!(
        requests[2].url,
        "http://example.com/foos/1/relationships/to-many-attribute"
    );
    assert_eq!(
        requests[2].body,
        Some(json!({"data": [{"type": "bars", "id": "13"}]}))
    );

    assert_eq!(requests[3].method, Method::Delete);
    assert_eq!(
        requests[3].url,
        "http://example.com/foos/1/relationships/to-many-attribute"
    );
    assert_eq!(
        requests[3].body,
        Some(json!({"data": [{"type": "bars", "id": "11"}]}))
    );

    // Deltas were consumed by the cascade.
    assert!(collection.added_resources().is_empty());
    assert!(collection.removed_resources().is_empty());
}

#[tokio::test]
async fn test_save_cascade_halts_on_first_failure() {
    let (mock, client) = client();
    mock.queue_response(200, json!({"data": {"type": "foos", "id": "1"}}));
    mock.queue_response(
        422,
        json!({"errors": [{"status": "422", "title": "Unprocessable"}]}),
    );

    let foo = client.instantiate("foos").unwrap();
    foo.set_id("1");
    foo.set_to_one("to_one_attribute", ToOneValue::Linked(bar(&client, "10")));
    let collection = foo.to_many_or_empty("to_many_attribute");
    collection.add_resource(&bar(&client, "13"));

    let error = client.save(&foo).await.unwrap_err();
    match error {
        Error::Server { code, errors } => {
            assert_eq!(code, 422);
            assert_eq!(errors[0].title.as_deref(), Some("Unprocessable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The to-many mutations were never issued and their delta survives.
    assert_eq!(mock.request_count(), 2);
    assert_eq!(collection.added_resources().len(), 1);
}

#[tokio::test]
async fn test_error_document_surfaces_api_errors() {
    let (mock, client) = client();
    mock.queue_response(
        400,
        json!({
            "errors": [
                {"status": "400", "title": "Bad filter"},
                {"status": "400", "title": "Bad include"},
            ]
        }),
    );

    let error = client.find_all("foos").await.unwrap_err();
    assert_eq!(error.domain(), ErrorDomain::Server);
    match error {
        Error::Server { code, errors } => {
            assert_eq!(code, 400);
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].title.as_deref(), Some("Bad filter"));
            assert_eq!(errors[1].title.as_deref(), Some("Bad include"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_find_one_on_empty_collection_is_not_found() {
    let (mock, client) = client();
    mock.queue_response(200, json!({"data": []}));

    let result = client.find_one(weft::Query::for_type("foos")).await;
    assert!(matches!(result, Err(Error::ResourceNotFound)));
}

#[tokio::test]
async fn test_load_next_page_appends_and_replaces_urls() {
    let (mock, client) = client();
    mock.queue_response(
        200,
        json!({
            "data": [{"type": "foos", "id": "1"}],
            "links": {
                "self": "http://example.com/foos?page[number]=1&page[size]=1",
                "next": "http://example.com/foos?page[number]=2&page[size]=1",
            }
        }),
    );

    let mut collection = client.find_all("foos").await.unwrap();
    assert_eq!(collection.len(), 1);
    let page_one = collection.resources_url().unwrap().clone();

    mock.queue_response(
        200,
        json!({
            "data": [{"type": "foos", "id": "2"}],
            "links": {
                "self": "http://example.com/foos?page[number]=2&page[size]=1",
                "prev": page_one.as_str(),
                "next": "http://example.com/foos?page[number]=3&page[size]=1",
            }
        }),
    );

    client.load_next_page(&mut collection).await.unwrap();

    // The fetch hit the next link verbatim.
    assert_eq!(
        mock.requests()[1].url,
        "http://example.com/foos?page[number]=2&page[size]=1"
    );

    // Appended in order, prior members intact.
    assert_eq!(collection.len(), 2);
    assert_eq!(collection.get(0).unwrap().id().as_deref(), Some("1"));
    assert_eq!(collection.get(1).unwrap().id().as_deref(), Some("2"));

    // The previous link now points at the page we came from.
    assert_eq!(collection.previous_url(), Some(&page_one));
    assert_eq!(
        collection.next_url().unwrap().as_str(),
        "http://example.com/foos?page[number]=3&page[size]=1"
    );
}

#[tokio::test]
async fn test_load_next_page_requires_a_next_link() {
    let (mock, client) = client();
    mock.queue_response(200, json!({"data": []}));

    let mut collection = client.find_all("foos").await.unwrap();
    let result = client.load_next_page(&mut collection).await;
    assert!(matches!(result, Err(Error::NextPageNotAvailable)));

    let result = client.load_previous_page(&mut collection).await;
    assert!(matches!(result, Err(Error::PreviousPageNotAvailable)));
}

#[tokio::test]
async fn test_ensure_fetches_stub_in_place_then_noops() {
    let (mock, client) = client();
    mock.queue_response(
        200,
        json!({
            "data": {
                "type": "foos",
                "id": "1",
                "relationships": {
                    "to-one-attribute": {
                        "links": {"related": "http://example.com/foos/1/to-one-attribute"},
                        "data": {"type": "bars", "id": "10"},
                    }
                },
            }
        }),
    );

    let foo = client.find_one_by_id("foos", "1").await.unwrap();
    let to_one = foo.to_one("to_one_attribute");
    let stub = to_one.resource().unwrap();

    mock.queue_response(
        200,
        json!({"data": {"type": "bars", "id": "10", "attributes": {"name": "Ten"}}}),
    );
    client.ensure(stub).await.unwrap();

    // The stub's own URL took precedence over the router-built one.
    assert_eq!(
        mock.requests()[1].url,
        "http://example.com/foos/1/to-one-attribute"
    );
    assert!(stub.is_loaded());
    assert_eq!(stub.attribute("name").unwrap().as_str(), Some("Ten"));

    // Loaded resources are left alone.
    let before = mock.request_count();
    client.ensure(stub).await.unwrap();
    assert_eq!(mock.request_count(), before);
}

#[tokio::test]
async fn test_delete_issues_delete() {
    let (mock, client) = client();
    mock.queue_empty_response(204);

    let foo = client.instantiate("foos").unwrap();
    foo.set_id("1");
    client.delete(&foo).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests[0].method, Method::Delete);
    assert_eq!(requests[0].url, "http://example.com/foos/1");
}

#[tokio::test]
async fn test_resource_url_takes_precedence_over_routing() {
    let (mock, client) = client();
    mock.queue_response(200, json!({"data": {"type": "foos", "id": "1"}}));

    let foo = client.instantiate("foos").unwrap();
    foo.set_id("1");
    foo.set_url(Url::parse("http://example.com/api/v2/foos/1").unwrap());

    client.save(&foo).await.unwrap();
    assert_eq!(mock.requests()[0].url, "http://example.com/api/v2/foos/1");
}

#[tokio::test]
async fn test_save_tolerates_empty_response_body() {
    let (mock, client) = client();
    mock.queue_empty_response(204);

    let foo = client.instantiate("foos").unwrap();
    foo.set_id("1");
    foo.set_attribute("string_attribute", "edited");

    client.save(&foo).await.unwrap();
    assert!(foo.is_loaded());
    assert!(foo.dirty_fields().is_empty());
}

#[test]
fn test_serialize_then_deserialize_preserves_identity_and_links() {
    let mut registry = Registry::new();
    registry.register(ResourceSchema::new(
        "foos",
        vec![
            Field::attribute("string_attribute"),
            Field::to_one("to_one_attribute", "bars"),
            Field::to_many("to_many_attribute", "bars"),
        ],
    ));
    registry.register(ResourceSchema::new("bars", vec![Field::attribute("name")]));
    let registry = Arc::new(registry);
    let formatters = Arc::new(ValueFormatterRegistry::new());
    let serializer = Serializer::new(formatters.clone(), KeyFormat::Dasherized);
    let deserializer = Deserializer::new(registry.clone(), formatters, KeyFormat::Dasherized);

    let foo = registry.instantiate("foos").unwrap();
    foo.set_id("1");
    foo.set_attribute("string_attribute", "stringValue");

    let ten = registry.instantiate("bars").unwrap();
    ten.set_id("10");
    foo.set_to_one("to_one_attribute", ToOneValue::Linked(ten));

    let thirteen = registry.instantiate("bars").unwrap();
    thirteen.set_id("13");
    foo.to_many_or_empty("to_many_attribute").add_resource(&thirteen);

    let options = SerializeOptions {
        include_to_one: true,
        include_to_many: true,
        ..SerializeOptions::default()
    };
    let body = serializer.serialize_resource(&foo, &options);
    let document = deserializer
        .deserialize(body.to_string().as_bytes(), &[])
        .unwrap();

    let round = &document.data[0];
    assert_eq!(round.type_name(), "foos");
    assert_eq!(round.id(), foo.id());
    assert_eq!(
        round.attribute("string_attribute").unwrap().as_str(),
        Some("stringValue")
    );
    assert_eq!(
        round.to_one("to_one_attribute").resource().unwrap().identifier(),
        Some(wire::ResourceIdentifier::new("bars", "10"))
    );
    assert_eq!(
        round.to_many("to_many_attribute").unwrap().linkage(),
        Some(vec![wire::ResourceIdentifier::new("bars", "13")])
    );
}
