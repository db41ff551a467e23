use formkit::assembly::global_dimension;
use formkit::cell::CellShape;
use formkit::dofmap::{CellDofmap, Dofmap};
use formkit::mesh::unit_square_triangulation;
use std::collections::{HashMap, HashSet};

#[test]
fn entity_closure_dofs_contain_the_entity_dofs() {
    let dofmap = CellDofmap::lagrange(CellShape::Tetrahedron, 2).unwrap();
    for dim in 0..=3 {
        for entity in 0..CellShape::Tetrahedron.num_entities(dim) {
            let mut own = vec![0; dofmap.num_entity_dofs(dim)];
            dofmap.tabulate_entity_dofs(&mut own, dim, entity);
            let mut closure = vec![0; dofmap.num_entity_closure_dofs(dim)];
            dofmap.tabulate_entity_closure_dofs(&mut closure, dim, entity);
            let closure: HashSet<usize> = closure.into_iter().collect();
            for dof in own {
                assert!(
                    closure.contains(&dof),
                    "dof {dof} of entity ({dim}, {entity}) missing from its closure"
                );
            }
        }
    }
}

#[test]
fn shared_entities_receive_the_same_global_dofs() {
    let mesh = unit_square_triangulation::<f64>(1, 1);
    let dofmap = CellDofmap::lagrange(CellShape::Triangle, 2).unwrap();

    let mut all_dofs = HashSet::new();
    // Maps (dim, global entity) to the global dofs both cells must agree on.
    let mut global_entity_dofs: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for cell in 0..mesh.num_cells() {
        let entity_indices = mesh.cell_entity_indices(cell);
        let mut dofs = vec![0; dofmap.num_element_dofs()];
        dofmap.tabulate_dofs(&mut dofs, mesh.num_global_entities(), &entity_indices);
        all_dofs.extend(dofs.iter().copied());

        // Walk the canonical entity-dimension-major layout.
        let mut cursor = 0;
        for dim in 0..=2 {
            let per_entity = dofmap.num_entity_dofs(dim);
            for &global_entity in entity_indices[dim] {
                let entity_dofs = dofs[cursor..cursor + per_entity].to_vec();
                cursor += per_entity;
                match global_entity_dofs.entry((dim, global_entity)) {
                    std::collections::hash_map::Entry::Occupied(seen) => {
                        assert_eq!(
                            seen.get(),
                            &entity_dofs,
                            "cells disagree on entity ({dim}, {global_entity})"
                        );
                    }
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(entity_dofs);
                    }
                }
            }
        }
        assert_eq!(cursor, dofmap.num_element_dofs());
    }

    // 4 vertices and 5 edges carry one dof each; the numbering is gapless.
    let dimension = global_dimension(&dofmap, mesh.num_global_entities());
    assert_eq!(dimension, 9);
    assert_eq!(all_dofs.len(), dimension);
    assert_eq!(all_dofs.iter().max(), Some(&(dimension - 1)));
}

#[test]
fn facet_dofs_match_the_facet_closure() {
    let dofmap = CellDofmap::lagrange(CellShape::Tetrahedron, 2).unwrap();
    assert_eq!(dofmap.num_facet_dofs(), 6);
    for facet in 0..4 {
        let mut facet_dofs = vec![0; dofmap.num_facet_dofs()];
        dofmap.tabulate_facet_dofs(&mut facet_dofs, facet);
        let mut closure_dofs = vec![0; dofmap.num_entity_closure_dofs(2)];
        dofmap.tabulate_entity_closure_dofs(&mut closure_dofs, 2, facet);
        assert_eq!(facet_dofs, closure_dofs);
    }
}

#[test]
fn sub_dofmaps_partition_a_vector_dofmap() {
    let dofmap = CellDofmap::vector_lagrange(CellShape::Triangle, 2, 3).unwrap();
    assert_eq!(dofmap.num_sub_dofmaps(), 3);
    let total: usize = (0..dofmap.num_sub_dofmaps())
        .map(|index| dofmap.create_sub_dofmap(index).unwrap().num_element_dofs())
        .sum();
    assert_eq!(total, dofmap.num_element_dofs());
}
