//! Ticket Integration Tests
//!
//! Tests for:
//! - TicketTable: creation, forwarding, resolution, cache invalidation
//! - Connection validation: cycles, type mismatches, stale tickets
//! - Releasing free-standing placeholder tickets
//! - Forwarding through a PassThroughPass inside a running graph

mod common;

use common::{ProducerPass, headless, new_graph, run_frame};
use myth_framegraph::prelude::*;
use myth_framegraph::{BackendCommand, FaultKind, TicketTable};

// ============================================================================
// Ticket Table
// ============================================================================

#[test]
fn fresh_ticket_resolves_to_itself() {
    let mut table = TicketTable::new();
    let ticket = table.create::<Texture2d>("Color", None);

    assert!(!ticket.is_null());
    assert_eq!(table.len(), 1);
    assert_eq!(table.name(ticket.id()), Some("Color"));
    assert_eq!(table.resolve(ticket.id()).unwrap(), ticket.id());
}

#[test]
fn null_ticket_never_resolves() {
    let table = TicketTable::new();
    let ticket = ResourceTicket::<Texture2d>::default();

    assert!(ticket.is_null());
    assert!(matches!(
        table.resolve(ticket.id()),
        Err(FrameGraphError::StaleTicket)
    ));
}

#[test]
fn forwarding_chain_resolves_to_terminal() {
    let mut table = TicketTable::new();
    let color = table.create::<Texture2d>("Color", None);
    let output = table.create::<Texture2d>("Output", None);
    let input = table.create::<Texture2d>("Input", None);
    table.connect(output.id(), color.id()).unwrap();
    table.connect(input.id(), output.id()).unwrap();

    assert_eq!(table.resolve(input.id()).unwrap(), color.id());
    assert_eq!(table.resolve(output.id()).unwrap(), color.id());
    assert_eq!(table.source(input.id()), Some(output.id()));
}

#[test]
fn relinking_invalidates_cached_resolution() {
    let mut table = TicketTable::new();
    let first = table.create::<u32>("First", None);
    let second = table.create::<u32>("Second", None);
    let middle = table.create::<u32>("Middle", None);
    let consumer = table.create::<u32>("Consumer", None);
    table.connect(middle.id(), first.id()).unwrap();
    table.connect(consumer.id(), middle.id()).unwrap();
    assert_eq!(table.resolve(consumer.id()).unwrap(), first.id());

    table.connect(middle.id(), second.id()).unwrap();
    assert_eq!(table.resolve(consumer.id()).unwrap(), second.id());

    assert!(table.disconnect(middle.id()));
    assert!(!table.disconnect(middle.id()));
    assert_eq!(table.resolve(consumer.id()).unwrap(), middle.id());
}

#[test]
fn long_chains_terminate() {
    let mut table = TicketTable::new();
    let root = table.create::<u32>("Root", None);
    let mut previous = root;
    for index in 0..200 {
        let next = table.create::<u32>(format!("Link{index}"), None);
        table.connect(next.id(), previous.id()).unwrap();
        previous = next;
    }

    assert_eq!(table.resolve(previous.id()).unwrap(), root.id());
    // Second lookup goes through the cached shortcut.
    assert_eq!(table.resolve(previous.id()).unwrap(), root.id());
}

// ============================================================================
// Connection Validation
// ============================================================================

#[test]
fn cycles_are_rejected() {
    let mut table = TicketTable::new();
    let a = table.create::<u32>("A", None);
    let b = table.create::<u32>("B", None);
    let c = table.create::<u32>("C", None);
    table.connect(a.id(), b.id()).unwrap();
    table.connect(b.id(), c.id()).unwrap();

    let err = table.connect(c.id(), a.id()).unwrap_err();
    assert!(matches!(err, FrameGraphError::CyclicForwarding { .. }));
    assert_eq!(err.kind(), FaultKind::Configuration);

    let err = table.connect(a.id(), a.id()).unwrap_err();
    assert!(matches!(err, FrameGraphError::CyclicForwarding { .. }));

    assert_eq!(table.source(c.id()), None);
    assert_eq!(table.resolve(a.id()).unwrap(), c.id());
}

#[test]
fn mismatched_types_are_rejected() {
    let mut table = TicketTable::new();
    let texture = table.create::<Texture2d>("Color", None);
    let value = table.create::<u32>("Count", None);

    let err = table.connect(value.id(), texture.id()).unwrap_err();
    assert!(matches!(err, FrameGraphError::TypeMismatch { .. }));
    assert_eq!(err.kind(), FaultKind::Validation);
}

#[test]
fn removed_owner_makes_tickets_stale() {
    let mut graph = new_graph();
    let producer = graph.add(ProducerPass::default()).unwrap();
    let color = graph.output::<Texture2d>(producer, "Color").unwrap();
    let alias = graph.create_ticket::<Texture2d>("Alias");
    graph.connect(alias, color).unwrap();
    assert_eq!(graph.registry().tickets().owner(color.id()), Some(producer));

    graph.remove(producer).unwrap();

    let tickets = graph.registry().tickets();
    assert!(!tickets.contains(color.id()));
    assert!(matches!(
        tickets.resolve(color.id()),
        Err(FrameGraphError::StaleTicket)
    ));
    assert_eq!(tickets.source(alias.id()), None);
    assert_eq!(tickets.resolve(alias.id()).unwrap(), alias.id());
}

#[test]
fn released_placeholder_is_removed() {
    let mut graph = new_graph();
    let producer = graph.add(ProducerPass::default()).unwrap();
    let color = graph.output::<Texture2d>(producer, "Color").unwrap();
    let placeholder = graph.create_ticket::<Texture2d>("Placeholder");
    let alias = graph.create_ticket::<Texture2d>("Alias");
    graph.connect(placeholder, color).unwrap();
    graph.connect(alias, placeholder).unwrap();
    let before = graph.registry().tickets().len();

    assert!(graph.release_ticket(placeholder));
    assert!(!graph.release_ticket(placeholder));
    assert!(!graph.release_ticket(color));

    let tickets = graph.registry().tickets();
    assert_eq!(tickets.len(), before - 1);
    assert!(!tickets.contains(placeholder.id()));
    assert!(tickets.contains(color.id()));
    assert_eq!(tickets.source(alias.id()), None);
    assert_eq!(tickets.resolve(alias.id()).unwrap(), alias.id());
}

#[test]
fn placeholders_created_per_frame_do_not_accumulate() {
    let mut graph = new_graph();
    let producer = graph.add(ProducerPass::default().forced()).unwrap();
    let baseline = graph.registry().tickets().len();

    for _ in 0..16 {
        let target = graph.create_ticket::<Texture2d>("Target");
        graph.connect_to_output(producer, "Color", target).unwrap();
        run_frame(&mut graph);
        graph.release_ticket(target);
    }

    assert_eq!(graph.registry().tickets().len(), baseline);
}

// ============================================================================
// Forwarding Through Passes
// ============================================================================

#[test]
fn pass_through_forwards_producer_output() {
    let mut graph = new_graph();
    let scene = graph.add(ProducerPass::default()).unwrap();
    let rename = graph.add(PassThroughPass::default()).unwrap();
    let post = graph.add(PostProcessPass::default()).unwrap();

    let rename_input = graph.input::<Texture2d>(rename, "Input").unwrap();
    graph.connect_to_output(scene, "Color", rename_input).unwrap();
    let post_input = graph.input::<Texture2d>(post, "Color").unwrap();
    graph.connect_to_output(rename, "Output", post_input).unwrap();

    let scene_color = graph.output::<Texture2d>(scene, "Color").unwrap();
    assert_eq!(
        graph.registry().tickets().resolve(post_input.id()).unwrap(),
        scene_color.id()
    );

    run_frame(&mut graph);

    assert!(!graph.pass_base(rename).unwrap().is_used());
    assert!(graph.pass_base(scene).unwrap().is_used());
    let texture = graph.get::<ProducerPass>().unwrap().last_texture.unwrap();
    assert!(headless(&graph).commands().contains(&BackendCommand::BindTexture {
        slot: "ColorMap".to_string(),
        texture: texture.handle(),
    }));
}

#[test]
fn removing_pass_through_breaks_the_chain() {
    let mut graph = new_graph();
    let scene = graph.add(ProducerPass::default()).unwrap();
    let rename = graph.add(PassThroughPass::default()).unwrap();
    let post = graph.add(PostProcessPass::default()).unwrap();
    let rename_input = graph.input::<Texture2d>(rename, "Input").unwrap();
    graph.connect_to_output(scene, "Color", rename_input).unwrap();
    let post_input = graph.input::<Texture2d>(post, "Color").unwrap();
    graph.connect_to_output(rename, "Output", post_input).unwrap();

    graph.remove(rename).unwrap();
    run_frame(&mut graph);

    assert_eq!(graph.registry().tickets().source(post_input.id()), None);
    assert!(!graph.pass_base(scene).unwrap().is_used());
    assert_eq!(graph.get::<ProducerPass>().unwrap().executions, 0);
}
