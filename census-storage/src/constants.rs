/// Name of the stable per-row identifier column of every axis dataframe.
pub const SOMA_JOINID: &str = "soma_joinid";

/// Row (obs) coordinate column of a sparse matrix.
pub const SOMA_DIM_0: &str = "soma_dim_0";

/// Column (var) coordinate column of a sparse matrix.
pub const SOMA_DIM_1: &str = "soma_dim_1";

/// Value column of a sparse matrix.
pub const SOMA_DATA: &str = "soma_data";

/// Type tag reported by sparse matrices.
pub const SPARSE_ND_ARRAY: &str = "SOMASparseNDArray";

/// Type tag reported by dense matrices.
pub const DENSE_ND_ARRAY: &str = "SOMADenseNDArray";

/// Rows per stored chunk when a backend is built without an explicit chunk size.
pub const DEFAULT_CHUNK_ROWS: usize = 65_536;
