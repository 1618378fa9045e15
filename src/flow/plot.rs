//! Step graph of the guide creator flow, rendered as standalone HTML.

use std::fmt;

use handlebars::Handlebars;
use petgraph::{
    Graph,
    dot::{Config, Dot},
    graph::NodeIndex,
    visit::{Topo, Walker},
};
use serde_json::json;

pub const DEFAULT_PLOT_FILE: &str = "guide_creator_flow.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    Begin,
    CreateOutline,
    WriteSections,
    CompileGuide,
}

impl FlowStep {
    pub const ALL: [FlowStep; 4] = [
        FlowStep::Begin,
        FlowStep::CreateOutline,
        FlowStep::WriteSections,
        FlowStep::CompileGuide,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowStep::Begin => "begin",
            FlowStep::CreateOutline => "create_outline",
            FlowStep::WriteSections => "write_sections",
            FlowStep::CompileGuide => "compile_guide",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FlowStep::Begin => "Seed topic and audience level",
            FlowStep::CreateOutline => "Generate the outline and save guide_outline.json",
            FlowStep::WriteSections => "Write every section with earlier sections as context",
            FlowStep::CompileGuide => "Assemble complete_guide.md",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `begin -> create_outline -> write_sections -> compile_guide`
pub fn step_graph() -> Graph<FlowStep, ()> {
    let mut graph = Graph::new();
    let nodes: Vec<NodeIndex> = FlowStep::ALL.iter().map(|s| graph.add_node(*s)).collect();
    for pair in nodes.windows(2) {
        graph.add_edge(pair[0], pair[1], ());
    }
    graph
}

const PLOT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<script type="module">
import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.esm.min.mjs";
mermaid.initialize({ startOnLoad: true });
</script>
<style>
body { font-family: sans-serif; margin: 2rem; }
li { margin: 0.3rem 0; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<pre class="mermaid">
{{{mermaid}}}
</pre>
<h2>Steps</h2>
<ol>
{{#each steps}}
<li><code>{{this.name}}</code> {{this.description}}</li>
{{/each}}
</ol>
<details>
<summary>Graphviz</summary>
<pre>{{dot}}</pre>
</details>
</body>
</html>
"#;

/// Render the flow graph as one HTML page.
pub fn render_html(title: &str) -> Result<String, handlebars::RenderError> {
    let graph = step_graph();
    let order: Vec<NodeIndex> = Topo::new(&graph).iter(&graph).collect();

    let steps: Vec<_> = order
        .iter()
        .map(|ix| json!({ "name": graph[*ix].name(), "description": graph[*ix].description() }))
        .collect();

    let mut mermaid = String::from("graph TD\n");
    for edge in graph.raw_edges() {
        let (from, to) = (graph[edge.source()], graph[edge.target()]);
        mermaid.push_str(&format!(
            "    {}[\"{}\"] --> {}[\"{}\"]\n",
            from.name(),
            from.name(),
            to.name(),
            to.name()
        ));
    }

    let dot = format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]));

    Handlebars::new().render_template(
        PLOT_TEMPLATE,
        &json!({ "title": title, "mermaid": mermaid, "steps": steps, "dot": dot }),
    )
}
