/*!
Reading catalogs and writing fit results to disk.
*/

pub mod csv;
