// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use shape_engine::{
    Agent, ObjectShape, Options, PropertyFlags, SymbolId,
    types::{InternalProperty, NamedPropertyDescriptor},
};

fn default_flags() -> PropertyFlags {
    PropertyFlags::default_new_named_property_flags()
}

fn properties_of(agent: &mut Agent, shape: ObjectShape) -> Vec<(SymbolId, NamedPropertyDescriptor)> {
    let mut properties = Vec::new();
    shape
        .for_each_property(agent, |name, desc| properties.push((name, desc)))
        .unwrap();
    properties
}

#[test]
fn added_properties_can_be_found() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let x = agent.intern("x");
    let y = agent.intern("y");
    let getter = default_flags().with_accessor(true).with_writable(false);

    let (s1, slot_x) = root.add_property(&mut agent, x, default_flags()).unwrap();
    let (s2, slot_y) = s1.add_property(&mut agent, y, getter).unwrap();
    assert_eq!((slot_x, slot_y), (0, 1));
    assert_eq!(s2.property_count(&agent), 2);

    let (_, desc) = s2.find_property(&mut agent, y, None).unwrap().unwrap();
    assert_eq!(desc, NamedPropertyDescriptor::new(getter, 1));
    let (_, desc) = s2.find_property(&mut agent, x, None).unwrap().unwrap();
    assert_eq!(desc, NamedPropertyDescriptor::new(default_flags(), 0));

    let z = agent.intern("z");
    assert!(s2.find_property(&mut agent, z, None).unwrap().is_none());
    assert!(root.find_property(&mut agent, x, None).unwrap().is_none());
}

#[test]
fn same_history_shares_shapes() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let b = agent.intern("b");

    let (first, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    let (first, _) = first.add_property(&mut agent, b, default_flags()).unwrap();
    let shapes = agent.heap.shape_count();
    let (second, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    let (second, _) = second.add_property(&mut agent, b, default_flags()).unwrap();
    assert_eq!(first, second);
    assert_eq!(agent.heap.shape_count(), shapes);

    // Different order or different flags give different shapes.
    let (other, _) = root.add_property(&mut agent, b, default_flags()).unwrap();
    let (other, _) = other.add_property(&mut agent, a, default_flags()).unwrap();
    assert_ne!(first, other);
    let hidden = default_flags().with_enumerable(false);
    let (hidden_a, _) = root.add_property(&mut agent, a, hidden).unwrap();
    assert_ne!(hidden_a, first.parent(&agent).unwrap());
    assert_eq!(root.transition_count(&agent), 3);
    let mut targets = Vec::new();
    root.for_each_transition(&agent, |_, target| targets.push(target));
    targets.sort();
    let mut expected = vec![first.parent(&agent).unwrap(), other.parent(&agent).unwrap(), hidden_a];
    expected.sort();
    assert_eq!(targets, expected);
}

#[test]
fn expected_flags_skip_materialization() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let b = agent.intern("b");
    let (s1, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    s1.add_property(&mut agent, b, default_flags()).unwrap();

    assert!(
        s1.find_property(&mut agent, b, Some(default_flags()))
            .unwrap()
            .is_none()
    );
    assert!(!s1.has_property_map(&agent));
    assert!(s1.find_property(&mut agent, a, Some(default_flags())).unwrap().is_some());
    assert!(s1.has_property_map(&agent));
}

#[test]
fn add_then_delete_scenario() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let b = agent.intern("b");

    let (s1, slot) = root.add_property(&mut agent, a, default_flags()).unwrap();
    assert_eq!(slot, 0);
    let (s2, slot) = s1.add_property(&mut agent, b, default_flags()).unwrap();
    assert_eq!(slot, 1);
    let (pos, desc) = s2.find_property(&mut agent, a, None).unwrap().unwrap();
    assert_eq!(desc, NamedPropertyDescriptor::new(default_flags(), 0));

    let d = s2.delete_property(&mut agent, pos).unwrap();
    assert_ne!(d, s2);
    assert!(d.is_dictionary(&agent));
    assert!(!d.is_dictionary_no_cache(&agent));
    assert!(!s2.is_dictionary(&agent));
    assert_eq!(d.property_count(&agent), 1);
    assert!(d.find_property(&mut agent, a, None).unwrap().is_none());
    let (_, desc) = d.find_property(&mut agent, b, None).unwrap().unwrap();
    assert_eq!(desc.slot, 1);
    assert_eq!(properties_of(&mut agent, d), vec![(b, desc)]);

    // The trie shape is still intact for other objects.
    assert_eq!(properties_of(&mut agent, s2).len(), 2);
}

#[test]
fn dictionary_mode_is_permanent() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c"].map(|name| agent.intern(name));
    let (s1, _) = root.add_property(&mut agent, names[0], default_flags()).unwrap();
    let (pos, _) = s1.find_property(&mut agent, names[0], None).unwrap().unwrap();
    let d = s1.delete_property(&mut agent, pos).unwrap();
    assert!(d.is_dictionary(&agent));

    // Additions happen in place and reuse the deleted slot.
    let (d2, slot) = d.add_property(&mut agent, names[1], default_flags()).unwrap();
    assert_eq!(d2, d);
    assert_eq!(slot, 0);
    let (d3, slot) = d2.add_property(&mut agent, names[2], default_flags()).unwrap();
    assert_eq!(d3, d);
    assert_eq!(slot, 1);

    let (pos, _) = d3.find_property(&mut agent, names[1], None).unwrap().unwrap();
    let read_only = default_flags().with_writable(false);
    let d4 = d3.update_property(&mut agent, pos, read_only).unwrap();
    assert!(d4.is_dictionary(&agent));
    assert!(d4.is_dictionary_no_cache(&agent));

    let d5 = d4.make_all_read_only(&mut agent).unwrap();
    assert!(d5.is_dictionary(&agent));
    let (pos, _) = d5.find_property(&mut agent, names[2], None).unwrap().unwrap();
    let d6 = d5.delete_property(&mut agent, pos).unwrap();
    assert_eq!(d6, d5);
    assert!(d6.is_dictionary_no_cache(&agent));
    assert!(d6.parent(&agent).is_none());
}

#[test]
fn deletion_from_cacheable_dictionary_switches_to_no_cache() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c"].map(|name| agent.intern(name));
    let mut shape = root;
    for name in names {
        shape = shape.add_property(&mut agent, name, default_flags()).unwrap().0;
    }
    let (pos, _) = shape.find_property(&mut agent, names[0], None).unwrap().unwrap();
    let cacheable = shape.delete_property(&mut agent, pos).unwrap();
    assert!(!cacheable.is_dictionary_no_cache(&agent));

    let (pos, _) = cacheable.find_property(&mut agent, names[1], None).unwrap().unwrap();
    let no_cache = cacheable.delete_property(&mut agent, pos).unwrap();
    assert_ne!(no_cache, cacheable);
    assert!(no_cache.is_dictionary_no_cache(&agent));
    let remaining: Vec<_> = properties_of(&mut agent, no_cache)
        .into_iter()
        .map(|(name, desc)| (name, desc.slot))
        .collect();
    assert_eq!(remaining, vec![(names[2], 2)]);

    // With the policy off, the cacheable dictionary is updated in place.
    let mut agent = Agent::new(Options {
        no_cache_on_dictionary_delete: false,
        ..Default::default()
    })
    .unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let b = agent.intern("b");
    let (s1, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    let (s2, _) = s1.add_property(&mut agent, b, default_flags()).unwrap();
    let (pos, _) = s2.find_property(&mut agent, a, None).unwrap().unwrap();
    let d = s2.delete_property(&mut agent, pos).unwrap();
    let (pos, _) = d.find_property(&mut agent, b, None).unwrap().unwrap();
    assert_eq!(d.delete_property(&mut agent, pos).unwrap(), d);
    assert!(!d.is_dictionary_no_cache(&agent));
    assert_eq!(d.property_count(&agent), 0);
}

#[test]
fn dictionary_threshold_stops_the_trie() {
    let mut agent = Agent::new(Options {
        dictionary_threshold: 4,
        ..Default::default()
    })
    .unwrap();
    let mut shape = agent.root_shape();
    let mut names = Vec::new();
    for i in 0..6 {
        let name = agent.intern(&format!("p{i}"));
        names.push(name);
        let (next, slot) = shape.add_property(&mut agent, name, default_flags()).unwrap();
        assert_eq!(slot, i);
        assert_eq!(next.is_dictionary(&agent), i >= 4, "property {i}");
        shape = next;
    }
    assert_eq!(shape.property_count(&agent), 6);
    for (i, name) in names.iter().enumerate() {
        let (_, desc) = shape.find_property(&mut agent, *name, None).unwrap().unwrap();
        assert_eq!(desc.slot as usize, i);
    }
}

#[test]
fn map_migration_preserves_properties() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c", "d"].map(|name| agent.intern(name));
    let (s1, _) = root.add_property(&mut agent, names[0], default_flags()).unwrap();
    let (s2, _) = s1.add_property(&mut agent, names[1], default_flags()).unwrap();
    let before = properties_of(&mut agent, s2);
    assert!(s2.has_property_map(&agent));

    let (s3, _) = s2.add_property(&mut agent, names[2], default_flags()).unwrap();
    assert!(s3.has_property_map(&agent));
    assert!(!s2.has_property_map(&agent));

    // The parent rebuilds the same properties after losing its map.
    assert_eq!(properties_of(&mut agent, s2), before);
    let mut expected = before.clone();
    expected.push((names[2], NamedPropertyDescriptor::new(default_flags(), 2)));
    assert_eq!(properties_of(&mut agent, s3), expected);

    let (s4, _) = s3.add_property(&mut agent, names[3], default_flags()).unwrap();
    expected.push((names[3], NamedPropertyDescriptor::new(default_flags(), 3)));
    assert_eq!(properties_of(&mut agent, s4), expected);
}

#[test]
fn freezing_converges() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let b = agent.intern("b");
    let accessor = default_flags().with_accessor(true);
    let (s1, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    let (s2, _) = s1.add_property(&mut agent, b, accessor).unwrap();
    assert!(!s2.are_all_read_only(&mut agent).unwrap());

    let frozen = s2.make_all_read_only(&mut agent).unwrap();
    assert_ne!(frozen, s2);
    assert!(!frozen.is_dictionary(&agent));
    assert!(frozen.flags(&agent).all_read_only);
    assert!(frozen.flags(&agent).all_non_configurable);
    let (_, desc) = frozen.find_property(&mut agent, a, None).unwrap().unwrap();
    assert!(!desc.flags.writable() && !desc.flags.configurable());
    assert_eq!(desc.slot, 0);
    // Accessors keep their writable bit.
    let (_, desc) = frozen.find_property(&mut agent, b, None).unwrap().unwrap();
    assert!(desc.flags.accessor() && !desc.flags.configurable());

    let shapes = agent.heap.shape_count();
    assert_eq!(frozen.make_all_read_only(&mut agent).unwrap(), frozen);
    assert_eq!(frozen.make_all_non_configurable(&mut agent).unwrap(), frozen);
    assert_eq!(s2.make_all_read_only(&mut agent).unwrap(), frozen);
    assert_eq!(agent.heap.shape_count(), shapes);
    assert!(frozen.is_known_leaf(&agent));
}

#[test]
fn sealing_then_freezing() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let (s1, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    assert!(!s1.are_all_non_configurable(&mut agent).unwrap());

    let sealed = s1.make_all_non_configurable(&mut agent).unwrap();
    assert!(sealed.are_all_non_configurable(&mut agent).unwrap());
    assert!(!sealed.are_all_read_only(&mut agent).unwrap());
    assert_eq!(sealed.parent(&agent), Some(s1));
    assert_eq!(sealed.property_count(&agent), 1);

    let frozen = sealed.make_all_read_only(&mut agent).unwrap();
    assert!(frozen.are_all_read_only(&mut agent).unwrap());
    assert_eq!(frozen.property_count(&agent), 1);
}

#[test]
fn unchanged_flags_are_a_no_op() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let a = agent.intern("a");
    let (s1, _) = root.add_property(&mut agent, a, default_flags()).unwrap();
    let (pos, desc) = s1.find_property(&mut agent, a, None).unwrap().unwrap();
    assert_eq!(s1.update_property(&mut agent, pos, desc.flags).unwrap(), s1);
    assert!(s1.is_known_leaf(&agent));

    let d = s1.copy_to_new_dictionary(&mut agent, false).unwrap();
    let (pos, desc) = d.find_property(&mut agent, a, None).unwrap().unwrap();
    assert_eq!(d.update_property(&mut agent, pos, desc.flags).unwrap(), d);
    assert!(!d.is_dictionary_no_cache(&agent));
}

#[test]
fn updating_flags_without_transitions() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c"].map(|name| agent.intern(name));
    let mut shape = root;
    for name in names {
        shape = shape.add_property(&mut agent, name, default_flags()).unwrap().0;
    }
    let writable = PropertyFlags::EMPTY.with_writable(true);
    let configurable = PropertyFlags::EMPTY.with_configurable(true);

    let updated = shape
        .update_property_flags_without_transitions(
            &mut agent,
            writable.with_configurable(true),
            PropertyFlags::EMPTY,
            Some(&names[1..]),
        )
        .unwrap();
    assert!(updated.is_dictionary(&agent));
    assert!(shape.is_known_leaf(&agent));
    let flags: Vec<_> = properties_of(&mut agent, updated)
        .into_iter()
        .map(|(_, desc)| (desc.flags.writable(), desc.flags.configurable()))
        .collect();
    assert_eq!(flags, vec![(true, true), (false, false), (false, false)]);
    assert!(!updated.are_all_non_configurable(&mut agent).unwrap());

    let all = updated
        .update_property_flags_without_transitions(&mut agent, configurable, PropertyFlags::EMPTY, None)
        .unwrap();
    assert!(all.are_all_non_configurable(&mut agent).unwrap());
    assert!(!all.are_all_read_only(&mut agent).unwrap());
}

#[test]
fn reserved_slots_come_first() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let (s1, slot0) = root.reserve_slot(&mut agent).unwrap();
    let (s2, slot1) = s1.reserve_slot(&mut agent).unwrap();
    assert_eq!((slot0, slot1), (0, 1));
    let a = agent.intern("a");
    let (s3, slot) = s2.add_property(&mut agent, a, default_flags()).unwrap();
    assert_eq!(slot, 2);
    assert_eq!(s3.property_count(&agent), 3);

    // Every object with the same internal layout shares the shape.
    assert_eq!(root.reserve_slot(&mut agent).unwrap().0, s1);
    let names: Vec<_> = properties_of(&mut agent, s3)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        names,
        vec![SymbolId::internal(0), SymbolId::internal(1), a]
    );
    assert!(names[..2].iter().all(|name| name.is_internal()));
    assert!(InternalProperty::COUNT > 2);
}

#[test]
fn index_like_names_are_flagged() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let length = agent.intern("length");
    let zero = agent.intern("0");
    let padded = agent.intern("01");
    let (s1, _) = root.add_property(&mut agent, length, default_flags()).unwrap();
    let (s2, _) = s1.add_property(&mut agent, padded, default_flags()).unwrap();
    assert!(!s2.has_index_like_properties(&agent));
    let (s3, _) = s2.add_property(&mut agent, zero, default_flags()).unwrap();
    assert!(s3.has_index_like_properties(&agent));

    let (pos, _) = s3.find_property(&mut agent, length, None).unwrap().unwrap();
    let d = s3.delete_property(&mut agent, pos).unwrap();
    assert!(d.has_index_like_properties(&agent));
}

#[test]
fn lookups_without_allocation() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c"].map(|name| agent.intern(name));
    let mut shape = root;
    for name in names {
        shape = shape.add_property(&mut agent, name, default_flags()).unwrap().0;
    }
    assert!(!shape.has_property_map(&agent));
    assert_eq!(shape.try_find_property_fast(&agent, names[0]), None);
    assert_eq!(root.try_find_property_fast(&agent, names[0]), Some(None));

    let desc = shape.find_property_no_alloc(&agent, names[1]).unwrap();
    assert_eq!(desc.slot, 1);
    let missing = agent.intern("missing");
    assert!(shape.find_property_no_alloc(&agent, missing).is_none());
    assert!(shape.debug_is_property_defined(&agent, names[2]));
    assert!(!shape.debug_is_property_defined(&agent, missing));

    let mut seen = Vec::new();
    shape.for_each_property_no_alloc(&agent, |name, desc| seen.push((name, desc.slot)));
    assert_eq!(seen, vec![(names[0], 0), (names[1], 1), (names[2], 2)]);
    assert!(!shape.has_property_map(&agent));

    let found = shape.try_find_property_fast(&agent, names[0]);
    assert_eq!(found, None);
    shape.find_property(&mut agent, names[0], None).unwrap();
    let (_, desc) = shape.try_find_property_fast(&agent, names[2]).unwrap().unwrap();
    assert_eq!(desc.slot, 2);
}

#[test]
fn iteration_can_stop_early() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let root = agent.root_shape();
    let names = ["a", "b", "c"].map(|name| agent.intern(name));
    let mut shape = root;
    for name in names {
        shape = shape.add_property(&mut agent, name, default_flags()).unwrap().0;
    }
    let mut seen = Vec::new();
    let completed = shape
        .for_each_property_while(&mut agent, |name, _| {
            seen.push(name);
            name != names[1]
        })
        .unwrap();
    assert!(!completed);
    assert_eq!(seen, names[..2]);
}

#[test]
fn separate_roots_are_unrelated() {
    let mut agent = Agent::new(Options::default()).unwrap();
    let other = ObjectShape::create_root(&mut agent).unwrap();
    assert_ne!(other, agent.root_shape());
    let a = agent.intern("a");
    let (s1, _) = agent
        .root_shape()
        .add_property(&mut agent, a, default_flags())
        .unwrap();
    let (t1, _) = other.add_property(&mut agent, a, default_flags()).unwrap();
    assert_ne!(s1, t1);
    assert_eq!(t1.parent(&agent), Some(other));
}
