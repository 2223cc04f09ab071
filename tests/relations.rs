mod common;

use common::client;
use model_orm::{Client, Entity, FlattenOptions, Related};
use serde_json::{json, Value};

async fn car_with_tires(client: &Client) -> Entity {
    let car = client
        .model("Car")
        .unwrap()
        .create_one(json!({ "make": "Saab" }))
        .await
        .unwrap();
    let tires = client.model("Tire").unwrap();
    for (position, brand, size) in [
        ("front-left", "acme", 16),
        ("front-right", "acme", 17),
        ("rear-left", "acme", 17),
        ("rear-right", "other", 16),
    ] {
        tires
            .create_one(json!({
                "position": position,
                "brand": brand,
                "size": size,
                "car": { "id": car.id() }
            }))
            .await
            .unwrap();
    }
    car
}

fn positions(related: &Related) -> Vec<Value> {
    related
        .many()
        .expect("a collection")
        .get("position")
        .into_iter()
        .map(|v| v.cloned().unwrap_or(Value::Null))
        .collect()
}

#[tokio::test]
async fn car_reads_its_four_tires() {
    let (client, _) = client();
    let mut car = car_with_tires(&client).await;

    let tires = car.read_in("tires", None).await.unwrap();
    let collection = tires.many().unwrap();
    assert_eq!(collection.len(), 4);
    assert_eq!(
        positions(&tires),
        [json!("front-left"), json!("front-right"), json!("rear-left"), json!("rear-right")]
    );
    assert!(collection.iter().all(|t| t.get("_car_ref") == Some(&car.id().to_value())));
    assert_eq!(collection.pos(3).unwrap().get("brand"), Some(&json!("other")));
    let first = collection.pos(0).unwrap();
    assert_eq!(collection.id(first.id()).unwrap().get("position"), Some(&json!("front-left")));

    assert!(car.attached("tires").is_some());
    let flat = car.flatten(FlattenOptions::default());
    assert_eq!(flat["make"], json!("Saab"));
    assert_eq!(flat["tires"].as_array().unwrap().len(), 4);
    assert!(flat["tires"][0].get("_car_ref").is_none());
}

#[tokio::test]
async fn tire_reads_back_to_its_car() {
    let (client, _) = client();
    let car = car_with_tires(&client).await;
    let mut tire = car
        .clone()
        .read_in("Tire", None)
        .await
        .unwrap()
        .many()
        .unwrap()
        .pos(0)
        .unwrap()
        .clone();

    let owner = tire.read_in("car", None).await.unwrap();
    assert_eq!(owner.one().unwrap().id(), car.id());
    assert_eq!(
        tire.attached("car").and_then(Related::one).map(|c| c.get("make").cloned()),
        Some(Some(json!("Saab")))
    );
}

#[tokio::test]
async fn nested_filters_narrow_the_traversal() {
    let (client, _) = client();
    let mut car = car_with_tires(&client).await;

    let filters = json!([
        { "brand": "acme" },
        { "OR": [
            { "size": 16 },
            { "and": [{ "size": 17 }, { "position": "rear-left" }] }
        ]}
    ]);
    let tires = car.read_in("tires", Some(&filters)).await.unwrap();
    assert_eq!(positions(&tires), [json!("front-left"), json!("rear-left")]);

    // values are read as the field's type, and empty groups constrain nothing
    let coerced = car
        .read_in("tires", Some(&json!({ "or": [{}, { "size": "17" }] })))
        .await
        .unwrap();
    assert_eq!(positions(&coerced), [json!("front-right"), json!("rear-left")]);

    let none = car
        .read_in("tires", Some(&json!({ "brand": "missing" })))
        .await
        .unwrap();
    assert!(none.many().unwrap().is_empty());

    assert!(car
        .read_in("tires", Some(&json!({ "colour": "red" })))
        .await
        .unwrap_err()
        .is_config());
}

#[tokio::test]
async fn one_to_one_from_reference_attaches_a_single_entity() {
    let (client, _) = client();
    let mut car = car_with_tires(&client).await;
    assert!(matches!(
        car.read_in("Engine", None).await.unwrap(),
        Related::One(None)
    ));

    client
        .model("Engine")
        .unwrap()
        .create_one(json!({ "hp": 110, "_car_ref": car.id().to_value() }))
        .await
        .unwrap();
    let engine = car.read_in("Engine", None).await.unwrap();
    assert_eq!(engine.one().unwrap().get("hp"), Some(&json!(110)));
}

#[tokio::test]
async fn set_ref_links_and_saves_the_reference() {
    let (client, _) = client();
    let people = client.model("Person").unwrap();
    let ada = people.create_one(json!({ "name": "Ada" })).await.unwrap();
    let mut car = client
        .model("Car")
        .unwrap()
        .create_one(json!({ "make": "Saab" }))
        .await
        .unwrap();

    car.set_ref("owner", &ada).unwrap();
    assert_eq!(car.get("_owner_ref"), Some(&ada.id().to_value()));
    assert!(car.save().await.unwrap());

    let mut read = client
        .model("Car")
        .unwrap()
        .get_by_id(car.id().clone())
        .await
        .unwrap()
        .unwrap();
    let owner = read.read_in("owner", None).await.unwrap();
    assert_eq!(owner.one().unwrap().get("name"), Some(&json!("Ada")));

    let mut ada = ada;
    let owned = ada.read_in("Car:owner", None).await.unwrap();
    assert_eq!(owned.many().unwrap().len(), 1);
}

#[tokio::test]
async fn collections_fan_out_and_select() {
    let (client, _) = client();
    let ada = client
        .model("Person")
        .unwrap()
        .create_one(json!({ "name": "Ada" }))
        .await
        .unwrap();
    let cars = client.model("Car").unwrap();
    let tires = client.model("Tire").unwrap();
    for make in ["Saab", "Volvo"] {
        let car = cars
            .create_one(json!({ "make": make, "owner": { "id": ada.id() } }))
            .await
            .unwrap();
        for position in ["front", "rear"] {
            tires
                .create_one(json!({ "position": position, "_car_ref": car.id().to_value() }))
                .await
                .unwrap();
        }
    }

    let mut ada = ada;
    let mut owned = match ada.read_in("Car:owner", None).await.unwrap() {
        Related::Many(c) => c,
        other => panic!("expected a collection, got {:?}", other),
    };
    assert_eq!(owned.get("make"), [Some(&json!("Saab")), Some(&json!("Volvo"))]);

    let results = owned.read_in("tires", None).await;
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r.as_ref().unwrap().many().unwrap().len(), 2);
    }
    assert_eq!(owned.select("tires").len(), 4);
    assert!(owned.select("engine").is_empty());

    let flat = owned.flatten(FlattenOptions::default());
    assert_eq!(flat[1]["make"], json!("Volvo"));
    assert_eq!(flat[1]["tires"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn references_left_empty_read_as_nothing() {
    let (client, _) = client();
    let mut tire = client
        .model("Tire")
        .unwrap()
        .create_one(json!({ "position": "spare" }))
        .await
        .unwrap();
    assert!(matches!(tire.read_in("car", None).await.unwrap(), Related::One(None)));
}
