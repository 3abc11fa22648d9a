//! Promise pipelining against a simulated remote vat.
//!
//! Messages to a far object are shipped over a fake wire and delivered a
//! turn later. Messages sent to an answer that has not come back yet are
//! shipped too, addressed to the answer, so a chain of dependent calls
//! costs one trip instead of one per call.
//!
//! Run with `RUST_LOG=eventual_send=debug cargo run --example pipelining`.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use eventual_send::prelude::*;
use eventual_send::LocalHandler;
use tracing_subscriber::EnvFilter;

type Slot = Rc<RefCell<Option<Value>>>;

/// Handler for a far reference. `slot` holds the real object on the far
/// side once it exists.
struct Far {
    name: String,
    slot: Slot,
    shipped: Rc<Cell<usize>>,
}

impl Far {
    fn ship(&self, message: Message) -> Value {
        self.shipped.set(self.shipped.get() + 1);
        println!("  -> {} {:?}", self.name, message.op);

        let answer_slot: Slot = Rc::new(RefCell::new(None));
        let answer_far = Rc::new(Far {
            name: format!("answer of {}", message.name()),
            slot: answer_slot.clone(),
            shipped: self.shipped.clone(),
        });
        let pending: Rc<dyn Handler> = answer_far.clone();
        let (answer, resolvers) = HandledPromise::with_resolvers(Some(pending));

        let target = self.slot.clone();
        turn::enqueue(move || {
            let delivered = target
                .borrow()
                .clone()
                .ok_or_else(|| Error::usage("delivered before its target"))
                .and_then(|far| dispatch("farSide", &LocalHandler, &message, &far, None));
            let settled = match delivered {
                Ok(value @ Value::Object(_)) => {
                    *answer_slot.borrow_mut() = Some(value);
                    resolvers.resolve_with_presence(answer_far, PresenceOptions::default())
                }
                Ok(value) => resolvers.resolve(value),
                Err(reason) => resolvers.reject(reason),
            };
            if let Err(error) = settled {
                tracing::error!(%error, "far answer could not settle");
            }
        });
        answer.into()
    }
}

impl Handler for Far {
    fn operations(&self) -> Operations {
        Operations::GET | Operations::APPLY_METHOD
    }

    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name.as_str())
    }

    fn get(&self, _target: &Value, key: &PropertyKey, _result: Option<&HandledPromise>) -> Result<Value> {
        Ok(self.ship(Message::get(key.clone())))
    }

    fn apply_method(
        &self,
        _target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        Ok(self.ship(Message::apply_method(method.cloned(), args.iter().cloned())))
    }
}

fn account(owner: &str) -> Object {
    let balance = Rc::new(Cell::new(0i64));
    let credit = balance.clone();
    Object::new()
        .with("owner", owner)
        .method("deposit", move |_, args| {
            credit.set(credit.get() + args.first().and_then(Value::as_int).unwrap_or(0));
            Ok(Value::Int(credit.get()))
        })
        .method("balance", move |_, _| Ok(Value::Int(balance.get())))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bank = Object::new().method("open", |_, args| {
        let owner = args.first().and_then(Value::as_str).unwrap_or("nobody");
        Ok(account(owner).into())
    });

    let shipped = Rc::new(Cell::new(0));
    let (bank_ref, resolvers) = HandledPromise::with_resolvers(None);
    let far_bank = Rc::new(Far {
        name: "bank".into(),
        slot: Rc::new(RefCell::new(Some(bank.into()))),
        shipped: shipped.clone(),
    });
    resolvers.resolve_with_presence(far_bank, PresenceOptions::default())?;

    println!("sending three dependent messages before any answer:");
    let acct = E::new(bank_ref).call("open", [Value::from("alice")]);
    let deposited = E::new(acct.clone()).call("deposit", [Value::Int(50)]);
    let owner = E::new(acct.clone()).get("owner");
    let balance = E::new(acct).call("balance", vec![]);

    let deposited = turn::block_on(deposited).ok_or("deposit stalled")??;
    let owner = turn::block_on(owner).ok_or("owner stalled")??;
    let balance = turn::block_on(balance).ok_or("balance stalled")??;

    println!("deposit -> {deposited:?}, owner -> {owner:?}, balance -> {balance:?}");
    println!("{} messages shipped", shipped.get());
    Ok(())
}
