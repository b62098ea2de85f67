//! End-to-end runs of the redbench engine against redbench-server; see `tests/`.
