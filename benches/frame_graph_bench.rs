use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use myth_framegraph::prelude::*;
use myth_framegraph::TicketTable;

/// Reads the previous stage and writes a same-sized color target.
#[derive(Default)]
struct Stage {
    input: ResourceTicket<Texture2d>,
    color: ResourceTicket<Texture2d>,
}

impl RenderPass for Stage {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.input = ctx.add_input("Input");
        self.color = ctx.add_output("Color");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        ctx.reference_optional(self.input);
        let def = TextureDef::new(ctx.width(), ctx.height(), wgpu::TextureFormat::Rgba16Float);
        ctx.declare(def, self.color)
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
        if let Some(input) = ctx.acquire_optional(self.input)? {
            ctx.backend().bind_texture("Source", &input)?;
        }
        ctx.acquire(self.color)?;
        ctx.backend().draw_fullscreen("Stage")?;
        Ok(())
    }
}

/// `stages` chained passes feeding a post-process, plus `stages / 4`
/// dangling passes that are culled every frame.
fn build_chain(stages: usize) -> FrameGraph {
    let mut graph = FrameGraph::new(HeadlessBackend::new(), &FrameGraphSettings::default());
    let mut previous: Option<PassId> = None;
    for _ in 0..stages {
        let stage = graph.add(Stage::default()).unwrap();
        if let Some(previous) = previous {
            let input = graph.input::<Texture2d>(stage, "Input").unwrap();
            graph.connect_to_output(previous, "Color", input).unwrap();
        }
        previous = Some(stage);
    }
    for _ in 0..stages / 4 {
        graph.add_named(Stage::default(), "Dangling").unwrap();
    }
    let post = graph.add(PostProcessPass::default()).unwrap();
    if let Some(previous) = previous {
        let input = graph.input::<Texture2d>(post, "Color").unwrap();
        graph.connect_to_output(previous, "Color", input).unwrap();
    }
    graph
}

// ---------------------------------------------------------------------------
// Frame execution
// ---------------------------------------------------------------------------

fn bench_steady_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_graph_steady_frame");
    for stages in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(stages), &stages, |b, &stages| {
            let mut graph = build_chain(stages);
            graph.execute().unwrap();
            graph.rendering_complete();
            b.iter(|| {
                black_box(graph.execute().unwrap());
                graph.rendering_complete();
            });
        });
    }
    group.finish();
}

fn bench_cold_frame(c: &mut Criterion) {
    c.bench_function("frame_graph_build_and_first_frame_16", |b| {
        b.iter_with_setup(
            || build_chain(16),
            |mut graph| {
                black_box(graph.execute().unwrap());
                graph
            },
        );
    });
}

// ---------------------------------------------------------------------------
// Ticket resolution
// ---------------------------------------------------------------------------

fn bench_ticket_resolve(c: &mut Criterion) {
    let mut table = TicketTable::new();
    let root = table.create::<Texture2d>("Root", None);
    let mut tail = root;
    for index in 0..64 {
        let next = table.create::<Texture2d>(format!("Link{index}"), None);
        table.connect(next.id(), tail.id()).unwrap();
        tail = next;
    }

    c.bench_function("ticket_resolve_64_links_cached", |b| {
        b.iter(|| black_box(table.resolve(black_box(tail.id())).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_steady_frame,
    bench_cold_frame,
    bench_ticket_resolve
);
criterion_main!(benches);
