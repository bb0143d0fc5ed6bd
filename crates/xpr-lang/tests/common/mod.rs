#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use xpr_lang::{HostError, HostObject, Shape, ShapeBuilder, TypeHint, Value};

#[derive(Debug)]
pub struct Customer {
    pub name: String,
    pub address: Value,
    pub tier: Mutex<i64>,
}

impl HostObject for Customer {
    fn shape(&self) -> Arc<Shape> {
        static SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(|| {
            ShapeBuilder::<Customer>::new("shop.Customer")
                .getter("name", |c| Value::from(c.name.as_str()))
                .field("address", TypeHint::Any, |c| c.address.clone())
                .field_mut(
                    "tier",
                    TypeHint::Long,
                    |c| Value::from(*c.tier.lock()),
                    |c, value| {
                        *c.tier.lock() = value.as_i64().ok_or_else(|| HostError::Argument {
                            index: 0,
                            expected: "long".into(),
                        })?;
                        Ok(())
                    },
                )
                .method("greet", &[TypeHint::String], |c, args| {
                    Ok(Value::from(format!("{}, {}", args[0], c.name)))
                })
                .method("greet", &[TypeHint::Int], |c, args| {
                    Ok(Value::from(format!("#{} {}", args[0], c.name)))
                })
                .build()
        });
        SHAPE.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Order {
    pub customer: Value,
    pub items: Value,
}

impl HostObject for Order {
    fn shape(&self) -> Arc<Shape> {
        order_shape()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn order_shape() -> Arc<Shape> {
    static SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(|| {
        ShapeBuilder::<Order>::new("shop.Order")
            .getter("customer", |o| o.customer.clone())
            .getter("items", |o| o.items.clone())
            .constructor(&[TypeHint::String], |args| Ok(order(&args[0].to_string(), Value::Null)))
            .build()
    });
    SHAPE.clone()
}

pub fn customer(name: &str, address: Value) -> Value {
    Value::object(Customer {
        name: name.to_string(),
        address,
        tier: Mutex::new(0),
    })
}

pub fn order(name: &str, address: Value) -> Value {
    Value::object(Order {
        customer: customer(name, address),
        items: Value::list([Value::from("pen"), Value::from("ink")]),
    })
}

pub fn address(city: &str) -> Value {
    Value::map([("city".into(), Value::from(city))])
}

/// Routes engine events to the test output; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Counts how often its methods run.
#[derive(Debug, Default)]
pub struct CallCounter {
    pub calls: AtomicUsize,
}

impl CallCounter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostObject for CallCounter {
    fn shape(&self) -> Arc<Shape> {
        static SHAPE: LazyLock<Arc<Shape>> = LazyLock::new(|| {
            ShapeBuilder::<CallCounter>::new("test.CallCounter")
                .method("touch", &[], |p, _| {
                    p.calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Bool(true))
                })
                .method("size", &[], |p, _| {
                    p.calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::from(3))
                })
                .build()
        });
        SHAPE.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A call-counting value and a reader for its count.
pub fn counter() -> (Value, impl Fn(&Value) -> usize) {
    let value = Value::object(CallCounter::default());
    (value, |value: &Value| value.downcast_ref::<CallCounter>().map(CallCounter::calls).unwrap_or_default())
}
