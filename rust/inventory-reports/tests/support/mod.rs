mod harness;

pub use harness::{read_json, with_inventory_harness, InventoryTestHarness};
