//! Graph command - show a tile's neighbor slots.

use std::path::PathBuf;

use dempipe::tile::{Direction, Layout, TileGraph, TileId};

use super::common::{load_config, IndexArgs};
use crate::error::CliError;

/// Arguments for the graph command.
pub struct GraphArgs {
    pub config: Option<PathBuf>,
    pub index: IndexArgs,
    pub tile: String,
}

/// Run the graph command.
pub fn run(args: GraphArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let footprints = args.index.source()?.fetch()?;
    let layout = Layout::new(config.folders);
    let graph = TileGraph::build(footprints, &layout)?;

    let id = TileId::new(&args.tile);
    print!("{}", describe(&graph, &id)?);
    Ok(())
}

/// Text report of `id` and its 8 neighbor slots.
pub fn describe(graph: &TileGraph, id: &TileId) -> Result<String, CliError> {
    let tile = graph
        .get(id)
        .ok_or_else(|| CliError::UnknownTile(id.to_string()))?;

    let mut out = format!("Tile {}\n", id);
    out.push_str(&format!("  input: {}\n", tile.filepath().display()));
    if let Some(bounds) = tile.bounds() {
        out.push_str(&format!(
            "  bounds: ({:.1}, {:.1}) - ({:.1}, {:.1})\n",
            bounds.min().x,
            bounds.min().y,
            bounds.max().x,
            bounds.max().y
        ));
    }
    out.push_str("  neighbors:\n");
    for direction in Direction::ALL {
        let name = tile
            .neighbors()
            .get(direction)
            .map(TileId::to_string)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("    {:<13} {}\n", direction.to_string(), name));
    }
    Ok(out)
}
