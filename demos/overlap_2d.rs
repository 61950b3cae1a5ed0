//! Split a 2D mesh into overlapping subdomains and print what each of them looks like.
//!
//! Usage: `cargo run --example overlap_2d [mesh.msh] [config.json]`
//!
//! Without arguments, a structured mesh of the unit square is used.
//! The mesh is cut into quadrants around the center of its bounding box.
//! The config file, if given, is an `OverlapConfig` in JSON,
//! e.g. `{ "depth": 2, "weighting": "uniform" }`.

use ddm_mesh as ddm;
use ddm::na;
use std::collections::BTreeMap;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mesh = match args.next() {
        Some(path) => ddm::gmsh::load_msh(&std::fs::read(path)?)?,
        None => ddm::mesh::fixtures::square_mesh(16),
    };
    let config: ddm::OverlapConfig = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ddm::OverlapConfig::default(),
    };

    let (min, max) = mesh.nodes.values().fold(
        (na::Vector3::repeat(f64::INFINITY), na::Vector3::repeat(f64::NEG_INFINITY)),
        |(min, max), c| (min.inf(c), max.sup(c)),
    );
    let center = (min + max) / 2.;
    let mesh = mesh.partition_by(|_, c| {
        usize::from(c.x > center.x) + 2 * usize::from(c.y > center.y)
    });

    let dd = ddm::Decomposition::build(&mesh, &config)?;
    println!(
        "{} subdomains, {} layers of overlap, {:?} weighting",
        dd.len(),
        config.depth,
        config.weighting
    );
    for (id, sub) in dd.subdomains() {
        let interface = &sub.mesh.physical_groups[ddm::INTERFACE_GROUP];
        println!(
            "  subdomain {id}: {} nodes, {} domain elements ({} own), {} interface facets",
            sub.node_count(),
            sub.mesh.domain_elements().count(),
            sub.partition_elements().count(),
            interface.elements.len(),
        );
        for (neighbor, shared) in &sub.intersections {
            println!("    shares {} nodes with {neighbor}", shared.len());
        }
    }

    // a global field survives the round trip through the subdomains
    let global = na::DVector::from_iterator(
        dd.global_node_ids().len(),
        dd.global_node_ids()
            .iter()
            .map(|id| mesh.nodes[id].x + mesh.nodes[id].y),
    );
    let locals = dd
        .subdomains()
        .keys()
        .map(|&id| Ok((id, dd.restrict(id, &global)?)))
        .collect::<Result<BTreeMap<_, _>, ddm::TransferError>>()?;
    let recombined = dd.recombine(&locals)?;
    println!(
        "max error after restrict + recombine: {:e}",
        (recombined - global).amax()
    );

    Ok(())
}
