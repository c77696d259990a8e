extern crate clap;
extern crate nexodb;

use clap::{Arg, ArgMatches, App, SubCommand};
use nexodb::{Cell, Database, Error};

fn open(matches: &ArgMatches) -> Result<Database, Error> {
	let path = matches.value_of("DB").expect("DB is a required argument; qed");
	Database::open(path)
}

fn do_dump(matches: &ArgMatches) -> Result<(), Error> {
	let db = open(matches)?;
	print!("{}", db.dump()?);
	Ok(())
}

fn do_atoms(matches: &ArgMatches) -> Result<(), Error> {
	let db = open(matches)?;
	print!("{}", db.dump_atoms()?);
	Ok(())
}

fn do_queue(matches: &ArgMatches) -> Result<(), Error> {
	let db = open(matches)?;
	let oid = match matches.value_of("OID") {
		Some(oid) => oid.parse::<u64>().unwrap_or(0),
		None => 0,
	};
	print!("{}", db.dump_queue(oid)?);
	Ok(())
}

fn do_meta(matches: &ArgMatches) -> Result<(), Error> {
	let db = open(matches)?;
	let name = matches.value_of("NAME").expect("NAME is a required argument; qed");
	match db.read_meta(name.as_bytes())? {
		Cell::Null => println!("no meta entry."),
		value => println!("{}", value.pretty()),
	}
	Ok(())
}

fn main() {
	let db_arg = Arg::with_name("DB")
		.short("d")
		.long("db")
		.takes_value(true)
		.required(true);

	let matches =
		App::new("nexodb-cli")
			.version("0.1.0")
			.about("Inspect a nexodb database file")
			.subcommand(SubCommand::with_name("dump")
				.about("Dump all records of the database")
				.arg(db_arg.clone()))
			.subcommand(SubCommand::with_name("atoms")
				.about("Dump the atom dictionary")
				.arg(db_arg.clone()))
			.subcommand(SubCommand::with_name("queue")
				.about("Dump queue slots, optionally for one object")
				.arg(db_arg.clone())
				.arg(Arg::with_name("OID")
					.short("o")
					.long("oid")
					.takes_value(true)))
			.subcommand(SubCommand::with_name("meta")
				.about("Read a named meta entry")
				.arg(db_arg.clone())
				.arg(Arg::with_name("NAME")
					.short("n")
					.long("name")
					.takes_value(true)
					.required(true)))
			.get_matches();

	let result = match matches.subcommand() {
		("dump", Some(sub)) => do_dump(sub),
		("atoms", Some(sub)) => do_atoms(sub),
		("queue", Some(sub)) => do_queue(sub),
		("meta", Some(sub)) => do_meta(sub),
		_ => {
			println!("{}", matches.usage());
			Ok(())
		},
	};

	if let Err(err) = result {
		println!("error: {}", err);
		::std::process::exit(1);
	}
}
