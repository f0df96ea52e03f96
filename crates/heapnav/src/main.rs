use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use heapnav_core::image::{demo, HeapImage};
use heapnav_core::prelude::*;
use heapnav_utils::{debug, info, init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingGuard};

mod render;

/// Navigate and decode objects in managed-heap snapshots.
#[derive(Parser, Debug)]
#[command(name = "heapnav")]
#[command(version)]
#[command(about = "Navigate and decode objects in managed-heap snapshots", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format (pretty or json); overrides HEAPNAV_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Translate a type name between generic naming grammars
    Translate
    {
        /// Target grammar
        #[arg(long, value_enum)]
        to: Grammar,
        /// Type name to translate
        name: String,
    },
    /// Navigate the built-in demo heap
    Demo
    {
        /// Type whose first instance is the starting object (either grammar)
        #[arg(long = "type", default_value = "Fixtures.ClassWithReference")]
        type_name: String,
        /// Path to follow from the starting object (e.g. `Reference.Value`, `Values[2]`)
        #[arg(long)]
        path: Option<String>,
        /// Materialize the starting object into its local type and print the graph
        #[arg(long, default_value_t = false)]
        materialize: bool,
    },
    /// List the types of the demo heap
    Types,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Grammar
{
    /// ``List`1[[System.Int32]]``
    Bracket,
    /// `List<System.Int32>`
    Angle,
}

/// Navigations shown by `demo` when no path is given
const SHOWCASE: &[(&str, &str)] = &[
    ("Fixtures.ClassWithReference", "Reference.Value"),
    ("Fixtures.ClassWithStringProperty", "Field"),
    ("Fixtures.ClassWithStructField", "Value.Value"),
    ("Fixtures.StructWithStructWithStructField", "Value.Value.Value"),
    ("Fixtures.ClassWithArray", "Values[2]"),
    ("Fixtures.ClassWithArrayOfStruct", "Array[2].Value"),
    ("Fixtures.ClassWithArrayOfClass", "Values[2].Value"),
    (
        "System.Collections.Concurrent.ConcurrentDictionary`2[[System.Int32],[System.String]]",
        "m_tables.m_buckets[1].m_value",
    ),
    ("System.Collections.Concurrent.ConcurrentQueue<System.Int32>", "m_head.m_next"),
    ("Fixtures.ClassWithListOfString", "List._items[1]"),
];

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn start_logging(cli: &Cli) -> Result<LoggingGuard, heapnav_utils::LoggingError>
{
    match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => init_logging_with_level(level.unwrap_or(LogLevel::Warn), format.unwrap_or_default()),
    }
}

fn run_command(cli: Cli) -> HeapResult<()>
{
    match cli.command {
        Commands::Translate { to, name } => {
            let translated = match to {
                Grammar::Bracket => to_bracket_form(&name),
                Grammar::Angle => to_angle_form(&name),
            };
            println!("{translated}");
            Ok(())
        }
        Commands::Demo {
            type_name,
            path,
            materialize,
        } => {
            let image = demo::build()?;
            info!(objects = image.object_count(), bytes = image.size(), "demo heap ready");
            let heap = Heap::new(&image, &image);

            if materialize {
                return print_materialized(&image, heap, &type_name);
            }
            match path {
                Some(path) => print_navigation(&image, heap, &type_name, &path),
                None => {
                    for (type_name, path) in SHOWCASE {
                        print_navigation(&image, heap, type_name, path)?;
                    }
                    Ok(())
                }
            }
        }
        Commands::Types => {
            let image = demo::build()?;
            println!("{:<4} {:<14} {:>5}  NAME", "ID", "KIND", "SIZE");
            for ty in image.types().iter() {
                println!(
                    "{:<4} {:<14} {:>5}  {}",
                    ty.id.raw(),
                    kind_label(ty.kind),
                    ty.size,
                    to_bracket_form(&ty.name)
                );
            }
            Ok(())
        }
    }
}

fn first_instance<'a>(image: &HeapImage, heap: Heap<'a>, type_name: &str) -> HeapResult<Proxy<'a>>
{
    heap.proxies_of_type(image.object_addresses(), type_name)?
        .into_iter()
        .next()
        .ok_or_else(|| HeapError::UnknownType(format!("no instance of {type_name} in the demo heap")))
}

fn print_navigation(image: &HeapImage, heap: Heap<'_>, type_name: &str, path: &str) -> HeapResult<()>
{
    let root = first_instance(image, heap, type_name)?;
    debug!(root = %root.address(), path, "walking");
    let value = root.walk(path)?;
    println!("{}.{path} = {}", to_angle_form(type_name), render::field_value(&value));
    Ok(())
}

fn print_materialized<'a>(image: &'a HeapImage, heap: Heap<'a>, type_name: &str) -> HeapResult<()>
{
    let root = first_instance(image, heap, type_name)?;
    let graph = heap.marshaller(image).materialize_as(&root, &to_bracket_form(type_name))?;
    info!(instances = graph.object_count(), arrays = graph.array_count(), "materialized");
    print!("{}", render::graph(&graph));
    Ok(())
}

fn kind_label(kind: TypeKind) -> &'static str
{
    match kind {
        TypeKind::Primitive(_) => "primitive",
        TypeKind::ValueType => "struct",
        TypeKind::ReferenceType => "class",
        TypeKind::Array => "array",
        TypeKind::String => "string",
    }
}
