#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use schemata_core::model::{
    boolean, enumeration, integer, text, timestamptz, uuid, EnumType, FunctionBuilder,
    TableBuilder, TriggerBuilder, TriggerEvent, TriggerTiming,
};
use schemata_core::DatabaseDeclaration;

/// A small shop schema with an enum, a trigger function and two tables.
pub fn shop() -> DatabaseDeclaration {
    DatabaseDeclaration::new("shop")
        .enum_type(EnumType::new("product_state", ["DRAFT", "LISTED"]))
        .function(
            FunctionBuilder::new("touch_updated_at")
                .returns("trigger")
                .body("BEGIN\n  new.\"updatedAt\" = now();\n  RETURN new;\nEND;")
                .build(),
        )
        .table(
            TableBuilder::new("product")
                .column(uuid("id").primary_key())
                .column(text("title").not_null())
                .column(
                    enumeration("state", "product_state")
                        .not_null()
                        .default_str("DRAFT"),
                )
                .column(boolean("archived").not_null().default_bool(false))
                .column(timestamptz("updatedAt").not_null().default_expr("now()"))
                .trigger(
                    TriggerBuilder::new("product_updated_at", "touch_updated_at")
                        .timing(TriggerTiming::Before)
                        .on(TriggerEvent::Update)
                        .for_each_row(),
                )
                .build(),
        )
        .table(
            TableBuilder::new("stock")
                .column(uuid("productId").primary_key().references("product", "id"))
                .column(integer("quantity").not_null().default_int(0))
                .build(),
        )
}

/// Fixed generation times, one per day.
pub fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, 9, 30, 0).unwrap()
}
