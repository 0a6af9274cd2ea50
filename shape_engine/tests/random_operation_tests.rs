// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rand::{Rng, SeedableRng, rngs::StdRng};
use shape_engine::{Agent, ObjectShape, Options, PropertyFlags, SlotIndex, SymbolId};

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(SymbolId, PropertyFlags),
    Delete(SymbolId),
    Update(SymbolId, PropertyFlags),
}

const FLAG_CHOICES: [PropertyFlags; 4] = [
    PropertyFlags::default_new_named_property_flags(),
    PropertyFlags::default_builtin_method_flags(),
    PropertyFlags::EMPTY,
    PropertyFlags::EMPTY.with_accessor(true).with_enumerable(true),
];

fn apply(agent: &mut Agent, shape: ObjectShape, op: Op) -> (ObjectShape, Option<SlotIndex>) {
    match op {
        Op::Add(name, flags) => {
            let (next, slot) = shape.add_property(agent, name, flags).unwrap();
            (next, Some(slot))
        }
        Op::Delete(name) => {
            let (pos, _) = shape.find_property(agent, name, None).unwrap().unwrap();
            (shape.delete_property(agent, pos).unwrap(), None)
        }
        Op::Update(name, flags) => {
            let (pos, _) = shape.find_property(agent, name, None).unwrap().unwrap();
            (shape.update_property(agent, pos, flags).unwrap(), None)
        }
    }
}

fn run(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut agent = Agent::new(Options {
        dictionary_threshold: 6,
        ..Default::default()
    })
    .unwrap();
    let pool: Vec<SymbolId> = (0..10).map(|i| agent.intern(&format!("p{i}"))).collect();

    // Expected properties in insertion order.
    let mut model: Vec<(SymbolId, PropertyFlags, SlotIndex)> = Vec::new();
    let mut ops = Vec::new();
    let mut shapes = Vec::new();
    let mut shape = agent.root_shape();
    let mut was_dictionary = false;

    for _ in 0..60 {
        let absent: Vec<_> = pool
            .iter()
            .copied()
            .filter(|name| model.iter().all(|(present, ..)| present != name))
            .collect();
        let flags = FLAG_CHOICES[rng.random_range(0..FLAG_CHOICES.len())];
        let op = if model.is_empty() || (!absent.is_empty() && rng.random_bool(0.5)) {
            Op::Add(absent[rng.random_range(0..absent.len())], flags)
        } else if rng.random_bool(0.2) {
            Op::Delete(model[rng.random_range(0..model.len())].0)
        } else {
            Op::Update(model[rng.random_range(0..model.len())].0, flags)
        };

        let (next, slot) = apply(&mut agent, shape, op);
        match op {
            Op::Add(name, flags) => {
                let slot = slot.unwrap();
                assert!(
                    model.iter().all(|(.., used)| *used != slot),
                    "slot {slot} handed out twice"
                );
                model.push((name, flags, slot));
            }
            Op::Delete(name) => model.retain(|(present, ..)| *present != name),
            Op::Update(name, flags) => {
                let entry = model.iter_mut().find(|(present, ..)| *present == name).unwrap();
                entry.1 = flags;
            }
        }

        if was_dictionary {
            assert!(next.is_dictionary(&agent), "left dictionary mode after {op:?}");
        }
        was_dictionary = next.is_dictionary(&agent);
        assert_eq!(next.property_count(&agent) as usize, model.len());

        let mut walked = Vec::new();
        next.for_each_property_no_alloc(&agent, |name, desc| {
            walked.push((name, desc.flags, desc.slot))
        });
        assert_eq!(walked, model, "chain walk after {op:?}");
        let mut listed = Vec::new();
        next.for_each_property(&mut agent, |name, desc| {
            listed.push((name, desc.flags, desc.slot))
        })
        .unwrap();
        assert_eq!(listed, model, "property map after {op:?}");

        ops.push(op);
        shapes.push(next);
        shape = next;
    }

    // A second object with the same history shares every trie shape.
    let mut replay = agent.root_shape();
    for (op, original) in ops.into_iter().zip(shapes) {
        replay = apply(&mut agent, replay, op).0;
        if original.is_dictionary(&agent) {
            break;
        }
        assert_eq!(replay, original);
    }
}

#[test]
fn random_operations_match_model() {
    for seed in 0..32 {
        run(seed);
    }
}
