//! Forms: the aggregation point a driver consumes.
//!
//! A form ties together the elements and dofmaps of its arguments and
//! coefficients, the coordinate mapping of the underlying mesh, and the
//! integral kernels to run over each entity kind, keyed by subdomain id.
//! Dispatch is sparse: only explicitly registered subdomain ids carry their
//! own kernel, and every kind has an optional default that unregistered ids
//! fall back to.

use crate::dofmap::Dofmap;
use crate::element::FiniteElement;
use crate::error::ContractError;
use crate::integral::{
    CellIntegral, CustomIntegral, ExteriorFacetIntegral, InteriorFacetIntegral, VertexIntegral,
};
use crate::mapping::CoordinateMapping;
use crate::Real;
use rustc_hash::FxHashMap;

/// One generated (or hand-written) variational form.
///
/// Argument and coefficient spaces are addressed by a single index: indices
/// `0..rank` are the form arguments (test function first), indices
/// `rank..rank + num_coefficients` the coefficients.
pub trait Form<T: Real>: Send + Sync {
    /// String identifying the form, used by drivers for caching and
    /// dispatch.
    fn signature(&self) -> &str;

    /// Arity of the form: 0 for functionals, 1 for vectors, 2 for matrices.
    fn rank(&self) -> usize;

    /// Number of coefficient functions the form depends on.
    fn num_coefficients(&self) -> usize;

    /// Position of coefficient `index` in the originally authored form,
    /// before unused coefficients were pruned.
    fn original_coefficient_position(&self, index: usize) -> Result<usize, ContractError>;

    /// The coordinate mapping shared by all of the form's spaces.
    fn create_coordinate_mapping(&self) -> Box<dyn CoordinateMapping<T>>;

    /// Element of argument or coefficient `index`.
    fn create_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError>;

    /// Dofmap of argument or coefficient `index`.
    fn create_dofmap(&self, index: usize) -> Result<Box<dyn Dofmap>, ContractError>;

    /// One past the largest registered cell subdomain id; 0 when none are
    /// registered.
    fn max_cell_subdomain_id(&self) -> usize;
    fn max_exterior_facet_subdomain_id(&self) -> usize;
    fn max_interior_facet_subdomain_id(&self) -> usize;
    fn max_vertex_subdomain_id(&self) -> usize;
    fn max_custom_subdomain_id(&self) -> usize;

    /// Whether any cell integral (id-specific or default) is present.
    fn has_cell_integrals(&self) -> bool;
    fn has_exterior_facet_integrals(&self) -> bool;
    fn has_interior_facet_integrals(&self) -> bool;
    fn has_vertex_integrals(&self) -> bool;
    fn has_custom_integrals(&self) -> bool;

    /// The cell integral registered for exactly `subdomain_id`, if any.
    fn create_cell_integral(&self, subdomain_id: usize) -> Option<Box<dyn CellIntegral<T>>>;
    fn create_exterior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn ExteriorFacetIntegral<T>>>;
    fn create_interior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn InteriorFacetIntegral<T>>>;
    fn create_vertex_integral(&self, subdomain_id: usize) -> Option<Box<dyn VertexIntegral<T>>>;
    fn create_custom_integral(&self, subdomain_id: usize) -> Option<Box<dyn CustomIntegral<T>>>;

    /// The default cell integral, run on subdomain ids with no registered
    /// kernel.
    fn create_default_cell_integral(&self) -> Option<Box<dyn CellIntegral<T>>>;
    fn create_default_exterior_facet_integral(&self)
        -> Option<Box<dyn ExteriorFacetIntegral<T>>>;
    fn create_default_interior_facet_integral(&self)
        -> Option<Box<dyn InteriorFacetIntegral<T>>>;
    fn create_default_vertex_integral(&self) -> Option<Box<dyn VertexIntegral<T>>>;
    fn create_default_custom_integral(&self) -> Option<Box<dyn CustomIntegral<T>>>;

    /// Resolves the cell integral for `subdomain_id`: an exact registration
    /// wins, otherwise the default applies, otherwise there is nothing to
    /// run.
    fn cell_integral(&self, subdomain_id: usize) -> Option<Box<dyn CellIntegral<T>>> {
        self.create_cell_integral(subdomain_id)
            .or_else(|| self.create_default_cell_integral())
    }

    fn exterior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn ExteriorFacetIntegral<T>>> {
        self.create_exterior_facet_integral(subdomain_id)
            .or_else(|| self.create_default_exterior_facet_integral())
    }

    fn interior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn InteriorFacetIntegral<T>>> {
        self.create_interior_facet_integral(subdomain_id)
            .or_else(|| self.create_default_interior_facet_integral())
    }

    fn vertex_integral(&self, subdomain_id: usize) -> Option<Box<dyn VertexIntegral<T>>> {
        self.create_vertex_integral(subdomain_id)
            .or_else(|| self.create_default_vertex_integral())
    }

    fn custom_integral(&self, subdomain_id: usize) -> Option<Box<dyn CustomIntegral<T>>> {
        self.create_custom_integral(subdomain_id)
            .or_else(|| self.create_default_custom_integral())
    }
}

type MappingFactory<T> = Box<dyn Fn() -> Box<dyn CoordinateMapping<T>> + Send + Sync>;
type ElementFactory<T> = Box<dyn Fn() -> Box<dyn FiniteElement<T>> + Send + Sync>;
type DofmapFactory = Box<dyn Fn() -> Box<dyn Dofmap> + Send + Sync>;
type CellFactory<T> = Box<dyn Fn() -> Box<dyn CellIntegral<T>> + Send + Sync>;
type ExteriorFacetFactory<T> = Box<dyn Fn() -> Box<dyn ExteriorFacetIntegral<T>> + Send + Sync>;
type InteriorFacetFactory<T> = Box<dyn Fn() -> Box<dyn InteriorFacetIntegral<T>> + Send + Sync>;
type VertexFactory<T> = Box<dyn Fn() -> Box<dyn VertexIntegral<T>> + Send + Sync>;
type CustomFactory<T> = Box<dyn Fn() -> Box<dyn CustomIntegral<T>> + Send + Sync>;

/// A [`Form`] assembled at runtime from factory closures, standing in for a
/// generated form class. Built by `with_*` chaining.
pub struct GenericForm<T: Real> {
    signature: String,
    rank: usize,
    coordinate_mapping: MappingFactory<T>,
    argument_elements: Vec<ElementFactory<T>>,
    argument_dofmaps: Vec<DofmapFactory>,
    coefficient_elements: Vec<ElementFactory<T>>,
    coefficient_dofmaps: Vec<DofmapFactory>,
    original_positions: Vec<usize>,
    cell_integrals: FxHashMap<usize, CellFactory<T>>,
    exterior_facet_integrals: FxHashMap<usize, ExteriorFacetFactory<T>>,
    interior_facet_integrals: FxHashMap<usize, InteriorFacetFactory<T>>,
    vertex_integrals: FxHashMap<usize, VertexFactory<T>>,
    custom_integrals: FxHashMap<usize, CustomFactory<T>>,
    default_cell_integral: Option<CellFactory<T>>,
    default_exterior_facet_integral: Option<ExteriorFacetFactory<T>>,
    default_interior_facet_integral: Option<InteriorFacetFactory<T>>,
    default_vertex_integral: Option<VertexFactory<T>>,
    default_custom_integral: Option<CustomFactory<T>>,
}

impl<T: Real> GenericForm<T> {
    pub fn new(
        signature: impl Into<String>,
        coordinate_mapping: impl Fn() -> Box<dyn CoordinateMapping<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature: signature.into(),
            rank: 0,
            coordinate_mapping: Box::new(coordinate_mapping),
            argument_elements: Vec::new(),
            argument_dofmaps: Vec::new(),
            coefficient_elements: Vec::new(),
            coefficient_dofmaps: Vec::new(),
            original_positions: Vec::new(),
            cell_integrals: FxHashMap::default(),
            exterior_facet_integrals: FxHashMap::default(),
            interior_facet_integrals: FxHashMap::default(),
            vertex_integrals: FxHashMap::default(),
            custom_integrals: FxHashMap::default(),
            default_cell_integral: None,
            default_exterior_facet_integral: None,
            default_interior_facet_integral: None,
            default_vertex_integral: None,
            default_custom_integral: None,
        }
    }

    /// Appends one form argument (increasing the rank by one).
    pub fn with_argument(
        mut self,
        element: impl Fn() -> Box<dyn FiniteElement<T>> + Send + Sync + 'static,
        dofmap: impl Fn() -> Box<dyn Dofmap> + Send + Sync + 'static,
    ) -> Self {
        self.rank += 1;
        self.argument_elements.push(Box::new(element));
        self.argument_dofmaps.push(Box::new(dofmap));
        self
    }

    /// Appends one coefficient with its position in the original form.
    pub fn with_coefficient(
        mut self,
        original_position: usize,
        element: impl Fn() -> Box<dyn FiniteElement<T>> + Send + Sync + 'static,
        dofmap: impl Fn() -> Box<dyn Dofmap> + Send + Sync + 'static,
    ) -> Self {
        self.original_positions.push(original_position);
        self.coefficient_elements.push(Box::new(element));
        self.coefficient_dofmaps.push(Box::new(dofmap));
        self
    }

    pub fn with_cell_integral(
        mut self,
        subdomain_id: usize,
        factory: impl Fn() -> Box<dyn CellIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.cell_integrals.insert(subdomain_id, Box::new(factory));
        self
    }

    pub fn with_default_cell_integral(
        mut self,
        factory: impl Fn() -> Box<dyn CellIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.default_cell_integral = Some(Box::new(factory));
        self
    }

    pub fn with_exterior_facet_integral(
        mut self,
        subdomain_id: usize,
        factory: impl Fn() -> Box<dyn ExteriorFacetIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.exterior_facet_integrals.insert(subdomain_id, Box::new(factory));
        self
    }

    pub fn with_default_exterior_facet_integral(
        mut self,
        factory: impl Fn() -> Box<dyn ExteriorFacetIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.default_exterior_facet_integral = Some(Box::new(factory));
        self
    }

    pub fn with_interior_facet_integral(
        mut self,
        subdomain_id: usize,
        factory: impl Fn() -> Box<dyn InteriorFacetIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.interior_facet_integrals.insert(subdomain_id, Box::new(factory));
        self
    }

    pub fn with_default_interior_facet_integral(
        mut self,
        factory: impl Fn() -> Box<dyn InteriorFacetIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.default_interior_facet_integral = Some(Box::new(factory));
        self
    }

    pub fn with_vertex_integral(
        mut self,
        subdomain_id: usize,
        factory: impl Fn() -> Box<dyn VertexIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.vertex_integrals.insert(subdomain_id, Box::new(factory));
        self
    }

    pub fn with_default_vertex_integral(
        mut self,
        factory: impl Fn() -> Box<dyn VertexIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.default_vertex_integral = Some(Box::new(factory));
        self
    }

    pub fn with_custom_integral(
        mut self,
        subdomain_id: usize,
        factory: impl Fn() -> Box<dyn CustomIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.custom_integrals.insert(subdomain_id, Box::new(factory));
        self
    }

    pub fn with_default_custom_integral(
        mut self,
        factory: impl Fn() -> Box<dyn CustomIntegral<T>> + Send + Sync + 'static,
    ) -> Self {
        self.default_custom_integral = Some(Box::new(factory));
        self
    }
}

fn max_subdomain_id<V>(map: &FxHashMap<usize, V>) -> usize {
    map.keys().max().map(|&id| id + 1).unwrap_or(0)
}

impl<T: Real> Form<T> for GenericForm<T> {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn num_coefficients(&self) -> usize {
        self.coefficient_elements.len()
    }

    fn original_coefficient_position(&self, index: usize) -> Result<usize, ContractError> {
        self.original_positions
            .get(index)
            .copied()
            .ok_or(ContractError::OutOfRange {
                what: "coefficient",
                index,
                bound: self.original_positions.len(),
            })
    }

    fn create_coordinate_mapping(&self) -> Box<dyn CoordinateMapping<T>> {
        (self.coordinate_mapping)()
    }

    fn create_element(&self, index: usize) -> Result<Box<dyn FiniteElement<T>>, ContractError> {
        if index < self.rank {
            Ok(self.argument_elements[index]())
        } else if index - self.rank < self.coefficient_elements.len() {
            Ok(self.coefficient_elements[index - self.rank]())
        } else {
            Err(ContractError::OutOfRange {
                what: "form space",
                index,
                bound: self.rank + self.coefficient_elements.len(),
            })
        }
    }

    fn create_dofmap(&self, index: usize) -> Result<Box<dyn Dofmap>, ContractError> {
        if index < self.rank {
            Ok(self.argument_dofmaps[index]())
        } else if index - self.rank < self.coefficient_dofmaps.len() {
            Ok(self.coefficient_dofmaps[index - self.rank]())
        } else {
            Err(ContractError::OutOfRange {
                what: "form space",
                index,
                bound: self.rank + self.coefficient_dofmaps.len(),
            })
        }
    }

    fn max_cell_subdomain_id(&self) -> usize {
        max_subdomain_id(&self.cell_integrals)
    }

    fn max_exterior_facet_subdomain_id(&self) -> usize {
        max_subdomain_id(&self.exterior_facet_integrals)
    }

    fn max_interior_facet_subdomain_id(&self) -> usize {
        max_subdomain_id(&self.interior_facet_integrals)
    }

    fn max_vertex_subdomain_id(&self) -> usize {
        max_subdomain_id(&self.vertex_integrals)
    }

    fn max_custom_subdomain_id(&self) -> usize {
        max_subdomain_id(&self.custom_integrals)
    }

    fn has_cell_integrals(&self) -> bool {
        !self.cell_integrals.is_empty() || self.default_cell_integral.is_some()
    }

    fn has_exterior_facet_integrals(&self) -> bool {
        !self.exterior_facet_integrals.is_empty()
            || self.default_exterior_facet_integral.is_some()
    }

    fn has_interior_facet_integrals(&self) -> bool {
        !self.interior_facet_integrals.is_empty()
            || self.default_interior_facet_integral.is_some()
    }

    fn has_vertex_integrals(&self) -> bool {
        !self.vertex_integrals.is_empty() || self.default_vertex_integral.is_some()
    }

    fn has_custom_integrals(&self) -> bool {
        !self.custom_integrals.is_empty() || self.default_custom_integral.is_some()
    }

    fn create_cell_integral(&self, subdomain_id: usize) -> Option<Box<dyn CellIntegral<T>>> {
        self.cell_integrals.get(&subdomain_id).map(|factory| factory())
    }

    fn create_exterior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn ExteriorFacetIntegral<T>>> {
        self.exterior_facet_integrals.get(&subdomain_id).map(|factory| factory())
    }

    fn create_interior_facet_integral(
        &self,
        subdomain_id: usize,
    ) -> Option<Box<dyn InteriorFacetIntegral<T>>> {
        self.interior_facet_integrals.get(&subdomain_id).map(|factory| factory())
    }

    fn create_vertex_integral(&self, subdomain_id: usize) -> Option<Box<dyn VertexIntegral<T>>> {
        self.vertex_integrals.get(&subdomain_id).map(|factory| factory())
    }

    fn create_custom_integral(&self, subdomain_id: usize) -> Option<Box<dyn CustomIntegral<T>>> {
        self.custom_integrals.get(&subdomain_id).map(|factory| factory())
    }

    fn create_default_cell_integral(&self) -> Option<Box<dyn CellIntegral<T>>> {
        self.default_cell_integral.as_ref().map(|factory| factory())
    }

    fn create_default_exterior_facet_integral(
        &self,
    ) -> Option<Box<dyn ExteriorFacetIntegral<T>>> {
        self.default_exterior_facet_integral.as_ref().map(|factory| factory())
    }

    fn create_default_interior_facet_integral(
        &self,
    ) -> Option<Box<dyn InteriorFacetIntegral<T>>> {
        self.default_interior_facet_integral.as_ref().map(|factory| factory())
    }

    fn create_default_vertex_integral(&self) -> Option<Box<dyn VertexIntegral<T>>> {
        self.default_vertex_integral.as_ref().map(|factory| factory())
    }

    fn create_default_custom_integral(&self) -> Option<Box<dyn CustomIntegral<T>>> {
        self.default_custom_integral.as_ref().map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellShape;
    use crate::dofmap::CellDofmap;
    use crate::element::LagrangeElement;
    use crate::integral::{P1TriangleLaplaceIntegral, P1TriangleMassIntegral};
    use crate::mapping::IsoparametricMapping;

    fn p1_bilinear_form() -> GenericForm<f64> {
        let element = || -> Box<dyn FiniteElement<f64>> {
            Box::new(LagrangeElement::new(CellShape::Triangle, 1).unwrap())
        };
        let dofmap =
            || -> Box<dyn Dofmap> { Box::new(CellDofmap::lagrange(CellShape::Triangle, 1).unwrap()) };
        GenericForm::new("a(u, v)", || {
            Box::new(IsoparametricMapping::new(CellShape::Triangle, 1).unwrap())
        })
        .with_argument(element, dofmap)
        .with_argument(element, dofmap)
        .with_cell_integral(0, || Box::new(P1TriangleMassIntegral::new()))
        .with_default_cell_integral(|| Box::new(P1TriangleLaplaceIntegral::new()))
    }

    #[test]
    fn metadata_reflects_registrations() {
        let form = p1_bilinear_form();
        assert_eq!(form.rank(), 2);
        assert_eq!(form.num_coefficients(), 0);
        assert_eq!(form.max_cell_subdomain_id(), 1);
        assert!(form.has_cell_integrals());
        assert!(!form.has_exterior_facet_integrals());
        assert!(form.create_element(1).is_ok());
        assert!(form.create_element(2).is_err());
    }

    #[test]
    fn unregistered_ids_fall_back_to_the_default() {
        let form = p1_bilinear_form();
        // Registered id resolves the mass kernel, any other id the Laplace
        // default; the two are distinguishable by their row sums.
        let coordinates = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let mut mass = [0.0; 9];
        let mut fallback = [0.0; 9];
        form.cell_integral(0)
            .unwrap()
            .tabulate_tensor(&mut mass, &[], &coordinates, crate::cell::Orientation::Standard);
        form.cell_integral(7)
            .unwrap()
            .tabulate_tensor(&mut fallback, &[], &coordinates, crate::cell::Orientation::Standard);
        let mass_row: f64 = mass[0..3].iter().sum();
        let fallback_row: f64 = fallback[0..3].iter().sum();
        assert!(mass_row > 0.0);
        assert!(fallback_row.abs() < 1e-14);
        // Exact registrations are not shadowed by the default.
        assert!(form.create_cell_integral(7).is_none());
    }

    #[test]
    fn kinds_without_registrations_resolve_to_none() {
        let form = p1_bilinear_form();
        assert!(form.exterior_facet_integral(0).is_none());
        assert!(form.vertex_integral(0).is_none());
        assert_eq!(form.max_vertex_subdomain_id(), 0);
    }
}
