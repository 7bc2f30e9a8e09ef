//! Shared fixtures for unit tests.

use std::sync::Arc;

use odata_core::{MetadataCache, SchemaProvider};

pub const MODEL: &str = r#"{
    "schemas": [
        {
            "namespace": "Demo.Model",
            "alias": "demo",
            "entityTypes": [
                {
                    "name": "Person",
                    "key": ["Id"],
                    "properties": [
                        {"name": "Id", "type": "Edm.Int32", "nullable": false},
                        {"name": "Name", "type": "Edm.String"}
                    ],
                    "navigationProperties": [
                        {"name": "Friends", "type": "demo.Person", "collection": true},
                        {"name": "BestFriend", "type": "demo.Person"}
                    ]
                }
            ],
            "entityContainer": {
                "name": "Container",
                "entitySets": [
                    {"name": "People", "entityType": "demo.Person"},
                    {"name": "Hidden", "entityType": "demo.Person", "includeInServiceDocument": false}
                ],
                "singletons": [{"name": "Me", "type": "demo.Person"}]
            }
        }
    ]
}"#;

pub fn metadata() -> Arc<MetadataCache> {
    let provider = SchemaProvider::from_json_str(MODEL).unwrap();
    Arc::new(MetadataCache::new(Arc::new(provider)))
}
