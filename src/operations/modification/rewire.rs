use tracing::trace;

use crate::command::CommandContext;
use crate::error::{FeasibilityError, IntegrityError, Result};
use crate::meshing::edge_nodes;
use crate::model::{EntityRef, Model};
use crate::topology::{EdgeData, EdgeId, FaceId, TopoRef, TopologyStore, VertexData, VertexId};

/// Moves the group memberships of `old` to every entity of `new`.
pub(crate) fn hand_over(model: &mut Model, old: TopoRef, new: &[TopoRef]) {
    for &n in new {
        model.groups.inherit(EntityRef::Topo(old), EntityRef::Topo(n));
    }
    model.groups.forget(EntityRef::Topo(old));
}

/// Cuts `edge` after `k` of its mesh edges, counted from its first
/// vertex. Returns the new vertex and the two halves, first half first.
///
/// # Errors
///
/// Returns an error if `k` does not fall strictly inside the edge.
pub(crate) fn subdivide_edge(
    ctx: &mut CommandContext<'_>,
    edge: EdgeId,
    k: usize,
) -> Result<(VertexId, [EdgeId; 2])> {
    let data = ctx.model.topo.edge(edge)?.clone();
    let n = data.nb_edges();
    let name = ctx.model.topo.name(TopoRef::Edge(edge));
    let nodes = edge_nodes(ctx.model, ctx.oracle, edge)?;
    let point = match nodes.get(k) {
        Some(p) if k > 0 && k < n => *p,
        _ => {
            return Err(FeasibilityError::Unsupported(format!(
                "cannot cut {name} after {k} of its {n} mesh edges"
            ))
            .into())
        }
    };

    let (first_law, second_law) = data.meshing.split_at(k);
    let topo = &mut ctx.model.topo;
    let v = topo.add_vertex(VertexData::new(point));
    let mut first = EdgeData::new(data.vertices[0], v, first_law);
    first.association = data.association;
    let mut second = EdgeData::new(v, data.vertices[1], second_law);
    second.association = data.association;
    let e1 = topo.add_edge(first);
    let e2 = topo.add_edge(second);

    for f in topo.faces_using_edge(edge) {
        let face = topo.face(f)?.clone();
        for (s, chain) in face.sides.iter().enumerate() {
            let Some(i) = chain.iter().position(|e| *e == edge) else {
                continue;
            };
            let path = topo.walk_chain(face.corners[s], chain)?;
            let halves = if path[i] == data.vertices[0] {
                [e1, e2]
            } else {
                [e2, e1]
            };
            topo.face_mut(f)?.sides[s].splice(i..=i, halves);
        }
    }

    hand_over(
        ctx.model,
        TopoRef::Edge(edge),
        &[TopoRef::Edge(e1), TopoRef::Edge(e2)],
    );
    ctx.model.topo.remove(TopoRef::Edge(edge));
    trace!(edge = %name, k, n, "edge cut");
    Ok((v, [e1, e2]))
}

/// Vertex reached after `k` mesh edges when walking `chain` from
/// `start`, cutting an edge when no vertex sits there yet. An empty chain
/// is degenerate and yields `start`.
///
/// # Errors
///
/// Returns an error if the chain is broken or shorter than `k`.
pub(crate) fn vertex_at_count(
    ctx: &mut CommandContext<'_>,
    start: VertexId,
    chain: &[EdgeId],
    k: usize,
) -> Result<VertexId> {
    if k == 0 || chain.is_empty() {
        return Ok(start);
    }
    let mut current = start;
    let mut done = 0;
    for &e in chain {
        let data = ctx.model.topo.edge(e)?;
        let n = data.nb_edges();
        let forward = data.vertices[0] == current;
        let next = data.other(current).ok_or_else(|| {
            IntegrityError::Inconsistent(format!(
                "{} does not continue the chain",
                ctx.model.topo.name(TopoRef::Edge(e))
            ))
        })?;
        if done + n == k {
            return Ok(next);
        }
        if k < done + n {
            let local = if forward { k - done } else { n - (k - done) };
            let (v, _) = subdivide_edge(ctx, e, local)?;
            return Ok(v);
        }
        done += n;
        current = next;
    }
    Err(IntegrityError::Inconsistent(format!(
        "chain from {} has {done} mesh edges, fewer than {k}",
        ctx.model.topo.name(TopoRef::Vertex(start))
    ))
    .into())
}

/// Replaces `old` by `new` on every block side holding it.
///
/// # Errors
///
/// Returns an error if a block vanished while rewiring.
pub(crate) fn replace_face_in_blocks(topo: &mut TopologyStore, old: FaceId, new: &[FaceId]) -> Result<()> {
    for b in topo.blocks_using_face(old) {
        for side in &mut topo.block_mut(b)?.sides {
            if let Some(i) = side.iter().position(|f| *f == old) {
                side.splice(i..=i, new.iter().copied());
            }
        }
    }
    Ok(())
}

/// Replaces `old` by `new` on every face side holding it. Both edges must
/// join the same vertices.
///
/// # Errors
///
/// Returns an error if a face vanished while rewiring.
pub(crate) fn replace_edge_in_faces(topo: &mut TopologyStore, old: EdgeId, new: EdgeId) -> Result<()> {
    for f in topo.faces_using_edge(old) {
        for side in &mut topo.face_mut(f)?.sides {
            for e in side.iter_mut().filter(|e| **e == old) {
                *e = new;
            }
        }
    }
    Ok(())
}

/// Redirects every reference to `removed` onto `kept`, then destroys
/// `removed`. Edges joining both vertices are left to the caller.
///
/// # Errors
///
/// Returns an error if either vertex is missing.
pub(crate) fn merge_vertex(model: &mut Model, kept: VertexId, removed: VertexId) -> Result<()> {
    let topo = &mut model.topo;
    topo.vertex(kept)?;
    let removed_association = topo.vertex(removed)?.association;
    for e in topo.edges_at(removed) {
        for v in &mut topo.edge_mut(e)?.vertices {
            if *v == removed {
                *v = kept;
            }
        }
    }
    let faces: Vec<FaceId> = topo
        .faces()
        .filter(|(_, f)| f.corners.contains(&removed))
        .map(|(k, _)| k)
        .collect();
    for f in faces {
        for c in &mut topo.face_mut(f)?.corners {
            if *c == removed {
                *c = kept;
            }
        }
    }
    let blocks: Vec<_> = topo
        .blocks()
        .filter(|(_, b)| b.corners.contains(&removed))
        .map(|(k, _)| k)
        .collect();
    for b in blocks {
        for c in &mut topo.block_mut(b)?.corners {
            if *c == removed {
                *c = kept;
            }
        }
    }
    let kept_data = topo.vertex_mut(kept)?;
    if kept_data.association.is_none() {
        kept_data.association = removed_association;
    }
    model
        .groups
        .replace(EntityRef::Topo(TopoRef::Vertex(removed)), EntityRef::Topo(TopoRef::Vertex(kept)));
    model.topo.remove(TopoRef::Vertex(removed));
    Ok(())
}

/// Destroys the candidates nothing uses any more, highest dimension
/// first so that freeing a face can free its edges.
pub(crate) fn retire_unused(model: &mut Model, candidates: impl IntoIterator<Item = TopoRef>) -> usize {
    let mut candidates: Vec<TopoRef> = candidates.into_iter().collect();
    candidates.sort();
    candidates.dedup();
    candidates.sort_by_key(|t| std::cmp::Reverse(t.dimension()));
    let mut count = 0;
    for t in candidates {
        if model.topo.exists(t) && model.topo.users(t).is_empty() {
            model.groups.forget(EntityRef::Topo(t));
            model.topo.remove(t);
            count += 1;
        }
    }
    count
}
