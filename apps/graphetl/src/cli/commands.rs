//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::ExportFormat;
use crate::config::{Backend, Config, InputConfig};
use crate::process::ProcessAnalytics;
use crate::records::{
    MAX_IMPORT_FILE_SIZE, RecordSet, validate_file_path, validate_file_size, validate_output_path,
};
use crate::sample::{SampleSpec, generate};
use graphetl_core::export::canonical_crypto_hash;
use graphetl_core::{
    Analytics, AnalyticsStatus, CanonicalGraph, CustomerId, CustomerTier, DerivedEdges, EdgeLabel,
    EtlError, NodeKey, NodeLabel, NodeRecord, PropertyValue, RunReport, Session,
    SimilarityProjection, TierSummary, Unavailable, canonical_checksum, export_canonical,
    import_canonical,
};
use std::path::Path;

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), EtlError> {
    let db_path = &config.database.path;
    if db_path.exists() {
        if !force {
            return Err(EtlError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| EtlError::IoError(format!("Remove '{}': {}", db_path.display(), e)))?;
    }

    let session = open_session(config)?;
    save_session(&session, config)?;
    println!(
        "Initialized new {} database at {:?}",
        config.database.backend, db_path
    );
    Ok(())
}

// =============================================================================
// SAMPLE COMMAND
// =============================================================================

/// Write deterministic sample record files into `out`.
pub fn cmd_sample(out: &Path, spec: &SampleSpec, json_mode: bool) -> Result<(), EtlError> {
    std::fs::create_dir_all(out)
        .map_err(|e| EtlError::IoError(format!("Create '{}': {}", out.display(), e)))?;
    let files = InputConfig::in_dir(out);
    let records = generate(spec)?;
    records.write(&files)?;
    tracing::info!(seed = spec.seed, dir = %out.display(), "sample records written");

    if json_mode {
        print_json(&serde_json::json!({
            "seed": spec.seed,
            "customers": files.customers,
            "products": files.products,
            "orders": files.orders,
            "counts": {
                "customers": records.customers.len(),
                "products": records.products.len(),
                "orders": records.orders.len()
            }
        }));
        return Ok(());
    }

    println!("Sample Records (seed {})", spec.seed);
    println!("=========================");
    println!("Customers: {:>6}  {}", records.customers.len(), files.customers.display());
    println!("Products:  {:>6}  {}", records.products.len(), files.products.display());
    println!("Orders:    {:>6}  {}", records.orders.len(), files.orders.display());
    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// The configured analytics collaborator.
pub fn analytics_collaborator(config: &Config) -> Box<dyn Analytics> {
    match config
        .analytics
        .command
        .as_deref()
        .and_then(ProcessAnalytics::from_command)
    {
        Some(process) => Box::new(process),
        None => Box::new(Unavailable),
    }
}

/// Load records (from files, or generated from `sample_seed`) and run the
/// pipeline into the configured database.
pub fn cmd_run(
    config: &Config,
    sample_seed: Option<u64>,
    json_mode: bool,
) -> Result<RunReport, EtlError> {
    let records = match sample_seed {
        Some(seed) => generate(&SampleSpec {
            seed,
            ..SampleSpec::default()
        })?,
        None => RecordSet::read(&config.input)?,
    };
    let store = records.into_store()?;

    let mut session = open_session(config)?;
    let mut analytics = analytics_collaborator(config);
    tracing::info!(
        backend = %config.database.backend,
        database = %config.database.path.display(),
        clear_before_load = config.pipeline.clear_before_load,
        "pipeline starting"
    );
    let result = session.run(&store, analytics.as_mut(), &config.pipeline);
    // Whatever the pipeline committed is saved, even when a later step failed.
    save_session(&session, config)?;
    let report = result?;

    if json_mode {
        print_json(&serde_json::to_value(&report).unwrap_or_default());
        return Ok(report);
    }

    println!("graphetl Run Report");
    println!("===================");
    println!("Customers:      {}", report.customers);
    println!("Products:       {}", report.products);
    println!("Orders:         {}", report.orders);
    println!("Categories:     {}", report.categories);
    println!();
    println!("Nodes written:  {}", report.nodes_written);
    println!("Edges written:  {}", report.edges_written);
    println!("SIMILAR_TO:     {}", report.similarity_edges);
    println!("CO_PURCHASED:   {}", report.co_purchase_edges);
    println!();
    print_tiers(&report.tiers);
    if !report.analytics.is_empty() {
        println!();
        println!("Analytics:");
        for (algorithm, status) in &report.analytics {
            match status {
                AnalyticsStatus::Completed { nodes_written } => {
                    println!("  {:<12} completed ({} nodes)", algorithm, nodes_written);
                }
                AnalyticsStatus::Failed { message } => {
                    println!("  {:<12} failed: {}", algorithm, message);
                }
            }
        }
    }
    Ok(report)
}

fn print_tiers(tiers: &TierSummary) {
    println!("Tiers:");
    println!("  VIP:      {}", tiers.vip);
    println!("  Premium:  {}", tiers.premium);
    println!("  Standard: {}", tiers.standard);
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Tier counts read back from the `customer_tier` property.
///
/// Customers without metrics are not counted. An unknown tier name or a
/// non-text value fails with `SerializationError`.
fn tiers_from_nodes(customers: &[NodeRecord]) -> Result<TierSummary, EtlError> {
    let mut tiers = TierSummary::default();
    for node in customers {
        match node.properties.get("customer_tier") {
            Some(PropertyValue::Text(t)) => tiers.count(t.parse::<CustomerTier>()?),
            Some(other) => {
                return Err(EtlError::SerializationError(format!(
                    "{}: customer_tier is not text: {}",
                    node.key, other
                )));
            }
            None => {}
        }
    }
    Ok(tiers)
}

/// Show graph status.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), EtlError> {
    let session = open_session(config)?;
    let sink = session.sink();

    let mut node_counts = Vec::new();
    let mut customers = Vec::new();
    for label in NodeLabel::ALL {
        let nodes = sink.nodes(label)?;
        node_counts.push((label, nodes.len()));
        if label == NodeLabel::Customer {
            customers = nodes;
        }
    }
    let mut edge_counts = Vec::new();
    for label in EdgeLabel::ALL {
        edge_counts.push((label, sink.edges(label)?.len()));
    }
    let tiers = tiers_from_nodes(&customers)?;
    let constrained = sink.has_constraints()?;

    if json_mode {
        let nodes: serde_json::Map<String, serde_json::Value> = node_counts
            .iter()
            .map(|(label, count)| (label.to_string(), (*count).into()))
            .collect();
        let edges: serde_json::Map<String, serde_json::Value> = edge_counts
            .iter()
            .map(|(label, count)| (label.to_string(), (*count).into()))
            .collect();
        print_json(&serde_json::json!({
            "database": config.database.path.to_string_lossy(),
            "backend": config.database.backend,
            "constraints": constrained,
            "node_count": sink.node_count()?,
            "edge_count": sink.edge_count()?,
            "nodes": nodes,
            "edges": edges,
            "tiers": tiers
        }));
        return Ok(());
    }

    println!("graphetl Graph Status");
    println!("=====================");
    println!("Database:    {:?}", config.database.path);
    println!("Backend:     {}", config.database.backend);
    println!("Constraints: {}", if constrained { "on" } else { "off" });
    println!();
    println!("Nodes: {}", sink.node_count()?);
    for (label, count) in &node_counts {
        println!("  {:<14} {}", label, count);
    }
    println!("Edges: {}", sink.edge_count()?);
    for (label, count) in &edge_counts {
        println!("  {:<14} {}", label, count);
    }
    if tiers.total() > 0 {
        println!();
        print_tiers(&tiers);
    }
    Ok(())
}

// =============================================================================
// CUSTOMER / SIMILAR COMMANDS
// =============================================================================

fn customer_node(session: &Session, id: u64) -> Result<NodeRecord, EtlError> {
    session
        .sink()
        .node(NodeKey::new(NodeLabel::Customer, id))?
        .ok_or(EtlError::NodeNotFound {
            label: NodeLabel::Customer,
            id,
        })
}

fn similar_json(similar: &[(CustomerId, u64)]) -> serde_json::Value {
    similar
        .iter()
        .map(|(id, strength)| serde_json::json!({ "customer": id.0, "strength": strength }))
        .collect()
}

/// Show one customer node and its similar customers.
pub fn cmd_customer(config: &Config, id: u64, json_mode: bool) -> Result<(), EtlError> {
    let session = open_session(config)?;
    let node = customer_node(&session, id)?;
    let similar = DerivedEdges::from_sink(session.sink())?.similar_to(CustomerId(id));

    if json_mode {
        print_json(&serde_json::json!({
            "id": id,
            "properties": node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.to_string())))
                .collect::<serde_json::Map<_, _>>(),
            "similar": similar_json(&similar)
        }));
        return Ok(());
    }

    println!("Customer {}", id);
    println!("==========");
    for (name, value) in &node.properties {
        println!("  {:<18} {}", name, value);
    }
    println!();
    println!("Similar customers: {}", similar.len());
    for (other, strength) in &similar {
        println!("  {:<8} {} shared products", other.0, strength);
    }
    Ok(())
}

/// List customers similar to `id`, strongest first.
pub fn cmd_similar(config: &Config, id: u64, limit: usize, json_mode: bool) -> Result<(), EtlError> {
    let session = open_session(config)?;
    customer_node(&session, id)?;
    let mut similar = DerivedEdges::from_sink(session.sink())?.similar_to(CustomerId(id));
    similar.truncate(limit);

    if json_mode {
        print_json(&serde_json::json!({ "customer": id, "similar": similar_json(&similar) }));
        return Ok(());
    }

    println!("Customers similar to {}", id);
    println!("========================");
    if similar.is_empty() {
        println!("(none)");
    }
    for (other, strength) in &similar {
        println!("  {:<8} strength {}", other.0, strength);
    }
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

/// Export graph.
pub fn cmd_export(config: &Config, output: &Path, format: ExportFormat) -> Result<(), EtlError> {
    let validated_output = validate_output_path(output)?;
    let session = open_session(config)?;

    let data = match format {
        ExportFormat::Canonical => {
            let data = export_canonical(session.sink())?;
            println!("Checksum: {}", canonical_checksum(session.sink())?);
            data
        }
        ExportFormat::Json => {
            let graph = CanonicalGraph::from_sink(session.sink())?;
            serde_json::to_vec_pretty(&graph)
                .map_err(|e| EtlError::SerializationError(e.to_string()))?
        }
        ExportFormat::Projection => {
            let projection = SimilarityProjection::from_sink(session.sink())?;
            serde_json::to_vec_pretty(&projection)
                .map_err(|e| EtlError::SerializationError(e.to_string()))?
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| EtlError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Replace the graph with the contents of a canonical export.
pub fn cmd_import(config: &Config, input: &Path) -> Result<(), EtlError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| EtlError::IoError(format!("Read file: {}", e)))?;
    let graph = import_canonical(&data)?;

    let mut session = open_session(config)?;
    let sink = session.sink_mut();
    sink.clear()?;
    sink.ensure_constraints()?;
    graph.load_into(sink)?;
    save_session(&session, config)?;

    println!(
        "Imported graph: {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print the canonical checksum and BLAKE3 hash of the graph.
pub fn cmd_hash(config: &Config, json_mode: bool) -> Result<(), EtlError> {
    let session = open_session(config)?;
    let checksum = canonical_checksum(session.sink())?;
    let blake3 = canonical_crypto_hash(session.sink())?;

    if json_mode {
        print_json(&serde_json::json!({
            "checksum": checksum,
            "blake3": blake3,
            "node_count": session.sink().node_count()?,
            "edge_count": session.sink().edge_count()?
        }));
        return Ok(());
    }

    println!("Checksum: {}", checksum);
    println!("BLAKE3:   {}", blake3);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured sink.
///
/// The memory backend is snapshotted to the database path in canonical
/// format; an existing snapshot is loaded back with constraints enabled.
pub fn open_session(config: &Config) -> Result<Session, EtlError> {
    let db_path = &config.database.path;
    match config.database.backend {
        Backend::Redb => Session::with_redb(db_path),
        Backend::Memory => {
            let mut session = Session::new();
            if db_path.exists() {
                validate_file_size(db_path, MAX_IMPORT_FILE_SIZE)?;
                let data = std::fs::read(db_path)
                    .map_err(|e| EtlError::IoError(format!("Read db: {}", e)))?;
                let graph = import_canonical(&data)?;
                let sink = session.sink_mut();
                sink.ensure_constraints()?;
                graph.load_into(sink)?;
                tracing::debug!(
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    "memory snapshot loaded"
                );
            }
            Ok(session)
        }
    }
}

/// Persist the session. redb commits on every write, so only the memory
/// backend writes a snapshot.
pub fn save_session(session: &Session, config: &Config) -> Result<(), EtlError> {
    if session.is_persistent() {
        return Ok(());
    }
    let data = export_canonical(session.sink())?;
    std::fs::write(&config.database.path, &data)
        .map_err(|e| EtlError::IoError(format!("Write db: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
