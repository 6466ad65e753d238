//! Mesh builder for constructing solver meshes from input decks.
//!
//! Reads `*NODE`, `*ELEMENT` and `*NSET` cards. Node ids are mapped to dense
//! indices in ascending id order; one named node set becomes the contact
//! slave set.

use std::collections::{BTreeMap, HashMap};

use impact_inp::{Card, Deck};
use tracing::{debug, warn};

use crate::error::{Result, SolverError};
use crate::mesh::{ElementType, Mesh, Node};

/// Name of the node set used for wall contact unless configured otherwise.
pub const DEFAULT_SLAVE_SET: &str = "SLAVE";

/// Builds a mesh from a parsed input deck
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    slave_set: String,
    all_nodes_slave: bool,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self {
            slave_set: DEFAULT_SLAVE_SET.to_string(),
            all_nodes_slave: false,
        }
    }

    /// Name of the `*NSET` whose nodes take part in wall contact.
    pub fn slave_set(mut self, name: impl Into<String>) -> Self {
        self.slave_set = name.into();
        self
    }

    /// Make every node a contact candidate regardless of node sets.
    pub fn all_nodes_slave(mut self, enabled: bool) -> Self {
        self.all_nodes_slave = enabled;
        self
    }

    /// Build a mesh with the default slave set name.
    pub fn build_from_deck(deck: &Deck) -> Result<Mesh> {
        Self::new().build(deck)
    }

    pub fn build(&self, deck: &Deck) -> Result<Mesh> {
        let mut nodes = BTreeMap::<i32, Node>::new();
        for card in deck.cards_named("NODE") {
            for node in parse_node_card(card)? {
                let id = node.id;
                if nodes.insert(id, node).is_some() {
                    return Err(SolverError::InvalidMesh(format!(
                        "node {id} defined twice (card at line {})",
                        card.line_start
                    )));
                }
            }
        }
        if nodes.is_empty() {
            return Err(SolverError::InvalidMesh("deck defines no nodes".to_string()));
        }

        let index_of: HashMap<i32, usize> = nodes
            .keys()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();

        let mut element_type: Option<ElementType> = None;
        let mut connectivity = Vec::new();
        for card in deck.cards_named("ELEMENT") {
            let card_type = parse_element_type(card)?;
            match element_type {
                None => element_type = Some(card_type),
                Some(existing) if existing != card_type => {
                    return Err(SolverError::InvalidMesh(format!(
                        "mixed element types {existing:?} and {card_type:?} are not supported"
                    )));
                }
                Some(_) => {}
            }
            parse_element_rows(card, card_type, &index_of, &mut connectivity)?;
        }
        let element_type = element_type
            .ok_or_else(|| SolverError::InvalidMesh("deck defines no elements".to_string()))?;

        let positions: Vec<f64> = nodes.values().flat_map(|n| n.coords()).collect();
        let ids: Vec<i32> = nodes.keys().copied().collect();
        let mesh = Mesh::new(element_type, positions, connectivity)?.with_node_ids(ids)?;

        let mesh = if self.all_nodes_slave {
            mesh.with_all_nodes_slave()
        } else {
            let slave_ids = collect_node_set(deck, &self.slave_set)?;
            if slave_ids.is_empty() {
                warn!(set = %self.slave_set, "no slave node set found; wall contact is inactive");
            }
            let indices = slave_ids
                .iter()
                .map(|id| {
                    index_of.get(id).copied().ok_or_else(|| {
                        SolverError::InvalidMesh(format!(
                            "node set {} references unknown node {id}",
                            self.slave_set
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            mesh.with_slave_nodes(indices)?
        };

        debug!(
            nodes = mesh.num_nodes(),
            elements = mesh.num_elements(),
            slave_nodes = mesh.slave_nodes().len(),
            "built mesh from deck"
        );
        Ok(mesh)
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, what: &str, line: usize) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        SolverError::Parse(impact_inp::ParseError::new(
            line,
            format!("invalid {what}: '{raw}'"),
        ))
    })
}

fn parse_node_card(card: &Card) -> Result<Vec<Node>> {
    card.rows()
        .map(|(line, fields)| {
            if fields.len() < 4 {
                return Err(SolverError::Parse(impact_inp::ParseError::new(
                    line,
                    "node line needs an id and three coordinates",
                )));
            }
            Ok(Node::new(
                parse_field(fields[0], "node id", line)?,
                parse_field(fields[1], "x coordinate", line)?,
                parse_field(fields[2], "y coordinate", line)?,
                parse_field(fields[3], "z coordinate", line)?,
            ))
        })
        .collect()
}

fn parse_element_type(card: &Card) -> Result<ElementType> {
    let raw = card.parameter("TYPE").ok_or_else(|| {
        SolverError::Parse(impact_inp::ParseError::new(
            card.line_start,
            "*ELEMENT card missing TYPE parameter",
        ))
    })?;
    ElementType::from_abaqus_type(raw).ok_or_else(|| {
        let hint = if raw.eq_ignore_ascii_case("C3D8R") {
            "; reduced integration is not supported, use C3D8"
        } else {
            " (use C3D4 or C3D8)"
        };
        SolverError::InvalidMesh(format!("unsupported element type {raw}{hint}"))
    })
}

fn parse_element_rows(
    card: &Card,
    element_type: ElementType,
    index_of: &HashMap<i32, usize>,
    connectivity: &mut Vec<usize>,
) -> Result<()> {
    let npe = element_type.num_nodes();
    for (line, fields) in card.rows() {
        if fields.len() != npe + 1 {
            return Err(SolverError::Parse(impact_inp::ParseError::new(
                line,
                format!("{element_type:?} line needs an id and {npe} node ids"),
            )));
        }
        let element_id: i32 = parse_field(fields[0], "element id", line)?;
        for raw in &fields[1..] {
            let node_id: i32 = parse_field(raw, "node id", line)?;
            let index = index_of.get(&node_id).copied().ok_or_else(|| {
                SolverError::InvalidMesh(format!(
                    "Element {element_id} references non-existent node {node_id}"
                ))
            })?;
            connectivity.push(index);
        }
    }
    Ok(())
}

/// Node ids of every `*NSET, NSET=<name>` card, in deck order. `GENERATE`
/// cards list `start, end, increment` triples.
fn collect_node_set(deck: &Deck, name: &str) -> Result<Vec<i32>> {
    let mut ids = Vec::new();
    for card in deck.cards_named("NSET") {
        let matches = card
            .parameter("NSET")
            .is_some_and(|n| n.eq_ignore_ascii_case(name));
        if !matches {
            continue;
        }

        let generate = card.has_flag("GENERATE");
        for (line, fields) in card.rows() {
            if generate {
                if fields.len() < 2 {
                    return Err(SolverError::Parse(impact_inp::ParseError::new(
                        line,
                        "GENERATE line needs start and end",
                    )));
                }
                let start: i32 = parse_field(fields[0], "range start", line)?;
                let end: i32 = parse_field(fields[1], "range end", line)?;
                let step: i32 = match fields.get(2) {
                    Some(raw) => parse_field(raw, "range increment", line)?,
                    None => 1,
                };
                if step <= 0 {
                    return Err(SolverError::Parse(impact_inp::ParseError::new(
                        line,
                        "GENERATE increment must be positive",
                    )));
                }
                ids.extend((start..=end).step_by(step as usize));
            } else {
                for raw in fields {
                    ids.push(parse_field(raw, "node id", line)?);
                }
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TETS: &str = r#"
*NODE
10, 0.0, 0.0, 0.0
20, 1.0, 0.0, 0.0
30, 0.0, 1.0, 0.0
40, 0.0, 0.0, 1.0
50, 1.0, 1.0, 1.0
*ELEMENT, TYPE=C3D4, ELSET=EALL
1, 10, 20, 30, 40
2, 20, 30, 40, 50
*NSET, NSET=Slave
10, 20
*NSET, NSET=Slave, GENERATE
30, 50, 20
"#;

    #[test]
    fn maps_ids_to_dense_indices() {
        let deck = Deck::parse_str(TWO_TETS).unwrap();
        let mesh = MeshBuilder::build_from_deck(&deck).unwrap();

        assert_eq!(mesh.num_nodes(), 5);
        assert_eq!(mesh.num_elements(), 2);
        assert_eq!(mesh.element_nodes(1), &[1, 2, 3, 4]);
        assert_eq!(mesh.node_ids(), &[10, 20, 30, 40, 50]);
        assert_eq!(mesh.node_position(4), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn collects_slave_set_across_cards() {
        let deck = Deck::parse_str(TWO_TETS).unwrap();
        let mesh = MeshBuilder::build_from_deck(&deck).unwrap();
        // 10, 20 listed; GENERATE 30..=50 step 20 gives 30, 50
        assert_eq!(mesh.slave_nodes(), &[0, 1, 2, 4]);
    }

    #[test]
    fn missing_slave_set_leaves_contact_inactive() {
        let deck = Deck::parse_str(TWO_TETS).unwrap();
        let mesh = MeshBuilder::new().slave_set("WALLSIDE").build(&deck).unwrap();
        assert!(mesh.slave_nodes().is_empty());

        let all = MeshBuilder::new().all_nodes_slave(true).build(&deck).unwrap();
        assert_eq!(all.slave_nodes().len(), 5);
    }

    #[test]
    fn rejects_unknown_element_type() {
        let deck = Deck::parse_str("*NODE\n1,0,0,0\n*ELEMENT, TYPE=C3D10\n1,1\n").unwrap();
        let err = MeshBuilder::build_from_deck(&deck).unwrap_err();
        assert!(err.to_string().contains("C3D10"));
    }

    #[test]
    fn reduced_integration_hex_is_rejected() {
        let deck = Deck::parse_str("*NODE\n1,0,0,0\n*ELEMENT, TYPE=C3D8R\n1,1\n").unwrap();
        let err = MeshBuilder::build_from_deck(&deck).unwrap_err();
        assert!(matches!(err, SolverError::InvalidMesh(_)));
        assert!(err.to_string().contains("reduced integration"), "{err}");
    }

    #[test]
    fn rejects_unknown_node_reference() {
        let src = "*NODE\n1,0,0,0\n2,1,0,0\n3,0,1,0\n4,0,0,1\n*ELEMENT, TYPE=C3D4\n1,1,2,3,9\n";
        let err = MeshBuilder::build_from_deck(&Deck::parse_str(src).unwrap()).unwrap_err();
        assert!(err.to_string().contains("non-existent node 9"));
    }

    #[test]
    fn reports_bad_coordinate_with_line() {
        let src = "*NODE\n1,0,abc,0\n";
        let err = MeshBuilder::build_from_deck(&Deck::parse_str(src).unwrap()).unwrap_err();
        assert!(matches!(err, SolverError::Parse(ref e) if e.line == 2));
    }
}
